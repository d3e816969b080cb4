//! Bookkeeping for dictionaries carried alongside a stream of arrays.
//!
//! A writer assigns each dictionary-typed field an integer id the first time it sees
//! the field, and records the dictionary it last sent under that id. A reader fills
//! the same tables from the messages it receives. Fields are identified by address,
//! so two equal fields behind different `Arc`s receive different ids.

use std::sync::Arc;

use ahash::AHashMap;

use crate::array::ArrayData;
use crate::datatypes::Field;
use crate::error::{Error, Result};

#[derive(Default, Debug)]
pub struct DictionaryMemo {
    field_to_id: AHashMap<usize, i64>,
    id_to_field: AHashMap<i64, Arc<Field>>,
    id_to_dictionary: AHashMap<i64, Arc<ArrayData>>,
}

#[inline(always)]
fn address(field: &Arc<Field>) -> usize { Arc::as_ptr(field) as usize }

impl DictionaryMemo {
    pub fn new() -> Self { Self::default() }

    /// The id of `field`, assigning the next unused one if `field` is new.
    pub fn get_or_assign_id(&mut self, field: &Arc<Field>) -> i64 {
        if let Some(&id) = self.field_to_id.get(&address(field)) {
            return id;
        }
        let mut id = self.field_to_id.len() as i64;
        while self.id_to_field.contains_key(&id) {
            id += 1;
        }
        self.field_to_id.insert(address(field), id);
        self.id_to_field.insert(id, field.clone());
        id
    }

    pub fn get_id(&self, field: &Arc<Field>) -> Result<i64> {
        self.field_to_id
            .get(&address(field))
            .copied()
            .ok_or_else(|| Error::key_error(format!("field '{}' has no dictionary id", field.name)))
    }

    /// Registers `field` under `id`, failing if the id is taken.
    pub fn add_field(&mut self, id: i64, field: &Arc<Field>) -> Result<()> {
        if self.id_to_field.contains_key(&id) {
            return Err(Error::key_error(format!("dictionary id {} already has a field", id)));
        }
        self.field_to_id.insert(address(field), id);
        self.id_to_field.insert(id, field.clone());
        Ok(())
    }

    pub fn get_field(&self, id: i64) -> Result<&Arc<Field>> {
        self.id_to_field.get(&id).ok_or_else(|| Error::key_error(format!("dictionary id {} not found", id)))
    }

    /// Records the dictionary for `id`, failing if one is already recorded.
    pub fn add_dictionary(&mut self, id: i64, dictionary: Arc<ArrayData>) -> Result<()> {
        if self.id_to_dictionary.contains_key(&id) {
            return Err(Error::key_error(format!("dictionary with id {} already present", id)));
        }
        self.id_to_dictionary.insert(id, dictionary);
        Ok(())
    }

    pub fn get_dictionary(&self, id: i64) -> Result<&Arc<ArrayData>> {
        self.id_to_dictionary.get(&id).ok_or_else(|| Error::key_error(format!("dictionary id {} not found", id)))
    }

    /// Whether `field` has been assigned an id.
    pub fn has_dictionary(&self, field: &Arc<Field>) -> bool { self.field_to_id.contains_key(&address(field)) }

    pub fn has_dictionary_id(&self, id: i64) -> bool { self.id_to_dictionary.contains_key(&id) }

    /// The number of dictionaries recorded.
    pub fn size(&self) -> usize { self.id_to_dictionary.len() }

    /// Dictionaries by id.
    pub fn dictionaries(&self) -> &AHashMap<i64, Arc<ArrayData>> { &self.id_to_dictionary }

    /// Assigns ids to the dictionary-typed `fields` and records the dictionary each type carries.
    ///
    /// Fields of other types are skipped.
    pub fn collect_dictionaries(&mut self, fields: &[Arc<Field>]) -> Result<()> {
        for field in fields {
            if let Some(dictionary) = field.data_type.dictionary() {
                let id = self.get_or_assign_id(field);
                self.add_dictionary(id, dictionary.clone())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::SystemPool;
    use crate::builder::utf8_array;
    use crate::datatypes::DataType;
    use crate::error::ErrorKind;

    fn dictionary_field(name: &str, values: &[&str]) -> Arc<Field> {
        let values = values.iter().map(|value| Some(*value)).collect::<Vec<_>>();
        let dictionary = Arc::new(utf8_array(&values, &SystemPool::shared()).unwrap());
        Arc::new(Field::new(name, DataType::Dictionary(Box::new(DataType::Int32), dictionary), true))
    }

    #[test]
    fn ids_follow_identity() {
        let mut memo = DictionaryMemo::new();
        let first = dictionary_field("a", &["x"]);
        let second = Arc::new((*first).clone());
        assert_eq!(memo.get_or_assign_id(&first), 0);
        assert_eq!(memo.get_or_assign_id(&second), 1);
        assert_eq!(memo.get_or_assign_id(&first.clone()), 0);
        assert_eq!(memo.get_id(&second).unwrap(), 1);
        assert!(Arc::ptr_eq(memo.get_field(1).unwrap(), &second));
        assert!(memo.has_dictionary(&first));
        assert_eq!(memo.size(), 0);
    }

    #[test]
    fn unknown_and_duplicate_ids() {
        let mut memo = DictionaryMemo::new();
        let field = dictionary_field("a", &["x"]);
        assert_eq!(memo.get_id(&field).unwrap_err().kind(), ErrorKind::KeyError);
        assert_eq!(memo.get_field(7).unwrap_err().kind(), ErrorKind::KeyError);
        assert_eq!(memo.get_dictionary(7).unwrap_err().kind(), ErrorKind::KeyError);

        memo.add_field(7, &field).unwrap();
        assert_eq!(memo.get_id(&field).unwrap(), 7);
        assert_eq!(memo.add_field(7, &field).unwrap_err().kind(), ErrorKind::KeyError);

        let dictionary = field.data_type.dictionary().unwrap().clone();
        memo.add_dictionary(7, dictionary.clone()).unwrap();
        assert!(memo.has_dictionary_id(7));
        assert_eq!(memo.add_dictionary(7, dictionary).unwrap_err().kind(), ErrorKind::KeyError);
    }

    #[test]
    fn assigned_ids_skip_explicit_ones() {
        let mut memo = DictionaryMemo::new();
        memo.add_field(1, &dictionary_field("a", &[])).unwrap();
        assert_eq!(memo.get_or_assign_id(&dictionary_field("b", &[])), 2);
    }

    #[test]
    fn collects_dictionary_fields() {
        let mut memo = DictionaryMemo::new();
        let fields = vec![
            dictionary_field("a", &["x", "y"]),
            Arc::new(Field::new("b", DataType::Int64, false)),
            dictionary_field("c", &["z"]),
        ];
        memo.collect_dictionaries(&fields).unwrap();
        assert_eq!(memo.size(), 2);
        assert!(!memo.has_dictionary(&fields[1]));
        let id = memo.get_id(&fields[2]).unwrap();
        assert_eq!(memo.get_dictionary(id).unwrap().len(), 1);
        assert!(Arc::ptr_eq(memo.get_dictionary(0).unwrap(), fields[0].data_type.dictionary().unwrap()));

        // Collecting the same fields again re-sends dictionaries under known ids.
        assert_eq!(memo.collect_dictionaries(&fields).unwrap_err().kind(), ErrorKind::KeyError);
    }
}
