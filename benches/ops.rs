use bencher::{benchmark_group, benchmark_main, Bencher};

use columnar_kernels::bit_util::{BitReader, BitWriter};
use columnar_kernels::rle::{RleDecoder, RleEncoder};
use columnar_kernels::SystemPool;

const VALUES: usize = 4096;

fn runs(bit_width: usize) -> Vec<u64> {
    let max = (1u64 << bit_width) - 1;
    (0 .. VALUES as u64).map(|i| if (i / 64) % 2 == 0 { i & max } else { max }).collect()
}

fn rle_encode(b: &mut Bencher) {
    let values = runs(5);
    let mut buffer = vec![0u8; RleEncoder::max_buffer_size(5, VALUES) + RleEncoder::min_buffer_size(5)];
    b.bytes = VALUES as u64;
    b.iter(|| {
        let mut encoder = RleEncoder::new(&mut buffer, 5);
        for value in &values {
            encoder.put(*value).unwrap();
        }
        bencher::black_box(encoder.flush().unwrap());
    });
}

fn rle_decode(b: &mut Bencher) {
    let pool = SystemPool::shared();
    let mut encoder = RleEncoder::with_capacity(5, 0, &pool).unwrap();
    for value in runs(5) {
        encoder.put(value).unwrap();
    }
    let encoded = encoder.consume(&pool).unwrap();
    let mut out = vec![0u64; VALUES];
    b.bytes = VALUES as u64;
    b.iter(|| {
        let mut decoder = RleDecoder::new(encoded.as_slice(), 5);
        bencher::black_box(decoder.get_batch(&mut out).unwrap());
    });
}

fn rle_decode_dict(b: &mut Bencher) {
    let dictionary = (0 .. 32).map(|i| format!("entry {}", i)).collect::<Vec<_>>();
    let pool = SystemPool::shared();
    let mut encoder = RleEncoder::with_capacity(5, 0, &pool).unwrap();
    for value in runs(5) {
        encoder.put(value).unwrap();
    }
    let encoded = encoder.consume(&pool).unwrap();
    let mut out = vec![String::new(); VALUES];
    b.iter(|| {
        let mut decoder = RleDecoder::new(encoded.as_slice(), 5);
        bencher::black_box(decoder.get_batch_with_dict(&dictionary, &mut out).unwrap());
    });
}

fn bits_write(b: &mut Bencher) {
    let mut buffer = vec![0u8; VALUES * 2];
    b.bytes = (VALUES * 13 / 8) as u64;
    b.iter(|| {
        let mut writer = BitWriter::new(&mut buffer);
        for value in 0 .. VALUES as u64 {
            writer.put_value(value & 0x1FFF, 13).unwrap();
        }
        writer.flush();
        bencher::black_box(writer.bytes_written());
    });
}

fn bits_read(b: &mut Bencher) {
    let pool = SystemPool::shared();
    let mut writer = BitWriter::with_capacity(VALUES * 2, &pool).unwrap();
    for value in 0 .. VALUES as u64 {
        writer.put_value(value & 0x1FFF, 13).unwrap();
    }
    let encoded = writer.consume(&pool).unwrap();
    let mut out = vec![0u64; VALUES];
    b.bytes = encoded.len() as u64;
    b.iter(|| {
        let mut reader = BitReader::new(encoded.as_slice());
        reader.get_batch(13, &mut out).unwrap();
        bencher::black_box(&out);
    });
}

fn vlq_round_trip(b: &mut Bencher) {
    let pool = SystemPool::shared();
    b.iter(|| {
        let mut writer = BitWriter::with_capacity(VALUES * 3, &pool).unwrap();
        for value in 0 .. VALUES as i64 {
            writer.put_zigzag_vlq(value * 37 - 50_000).unwrap();
        }
        let encoded = writer.consume(&pool).unwrap();
        let mut reader = BitReader::new(encoded.as_slice());
        let mut total = 0i64;
        for _ in 0 .. VALUES {
            total = total.wrapping_add(reader.get_zigzag_vlq().unwrap());
        }
        bencher::black_box(total);
    });
}

benchmark_group!(
    rle,
    rle_encode,
    rle_decode,
    rle_decode_dict,
);

benchmark_group!(
    bits,
    bits_write,
    bits_read,
    vlq_round_trip,
);

benchmark_main!(rle, bits);
