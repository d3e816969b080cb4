use bencher::{benchmark_group, benchmark_main, Bencher};

use columnar_kernels::builder::{primitive_array, utf8_array};
use columnar_kernels::compute::{self, cast, CastOptions, FunctionContext};
use columnar_kernels::datatypes::{DataType, TimeUnit};
use columnar_kernels::encoding::{Decoder, DeltaBitPackDecoder, DeltaBitPackEncoder, Encoder, Int64Type};
use columnar_kernels::{ArrayData, Datum};

fn int64s(ctx: &FunctionContext, data_type: DataType) -> ArrayData {
    let values = (0 .. 1024i64).map(|i| if i % 7 == 0 { None } else { Some(i * 1000) }).collect::<Vec<_>>();
    primitive_array(data_type, &values, ctx.pool()).unwrap()
}

fn cast_narrow(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let input = primitive_array(DataType::Int64, &(0 .. 1024i64).map(|i| Some(i % 100)).collect::<Vec<_>>(), ctx.pool()).unwrap();
    b.bytes = 8 * 1024;
    b.iter(|| bencher::black_box(cast(&ctx, &input, &DataType::Int8, &CastOptions::default()).unwrap()));
}

fn cast_float(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let input = int64s(&ctx, DataType::Int64);
    b.bytes = 8 * 1024;
    b.iter(|| bencher::black_box(cast(&ctx, &input, &DataType::Float64, &CastOptions::default()).unwrap()));
}

fn cast_rescale(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let input = int64s(&ctx, DataType::Timestamp(TimeUnit::Millisecond));
    b.bytes = 8 * 1024;
    b.iter(|| bencher::black_box(cast(&ctx, &input, &DataType::Timestamp(TimeUnit::Second), &CastOptions::default()).unwrap()));
}

fn cast_zero_copy(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let input = int64s(&ctx, DataType::Int64);
    b.iter(|| bencher::black_box(cast(&ctx, &input, &DataType::Date64, &CastOptions::default()).unwrap()));
}

fn encode_int64(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let values = (0 .. 1024i64).map(|i| Some(i % 61)).collect::<Vec<_>>();
    let input = Datum::from(primitive_array(DataType::Int64, &values, ctx.pool()).unwrap());
    b.bytes = 8 * 1024;
    b.iter(|| bencher::black_box(compute::dictionary_encode(&ctx, &input).unwrap()));
}

fn encode_utf8(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let strings = (0 .. 1024).map(|i| format!("value: {}", i % 61)).collect::<Vec<_>>();
    let values = strings.iter().map(|s| Some(s.as_str())).collect::<Vec<_>>();
    let input = Datum::from(utf8_array(&values, ctx.pool()).unwrap());
    b.bytes = strings.iter().map(|s| s.len() as u64).sum();
    b.iter(|| bencher::black_box(compute::dictionary_encode(&ctx, &input).unwrap()));
}

fn delta_round_trip(b: &mut Bencher) {
    let ctx = FunctionContext::default();
    let values = (0 .. 1024i64).map(|i| i * 3 + (i % 5)).collect::<Vec<_>>();
    let mut out = vec![0i64; values.len()];
    b.bytes = 8 * 1024;
    b.iter(|| {
        let mut encoder = DeltaBitPackEncoder::<Int64Type>::new(ctx.pool());
        encoder.put(&values).unwrap();
        let page = encoder.flush_buffer().unwrap();
        let mut decoder = DeltaBitPackDecoder::<Int64Type>::new();
        decoder.set_data(values.len(), page.into()).unwrap();
        decoder.decode(&mut out).unwrap();
        bencher::black_box(&out);
    });
}

benchmark_group!(
    casts,
    cast_narrow,
    cast_float,
    cast_rescale,
    cast_zero_copy,
);

benchmark_group!(
    hashing,
    encode_int64,
    encode_utf8,
    delta_round_trip,
);

benchmark_main!(casts, hashing);
