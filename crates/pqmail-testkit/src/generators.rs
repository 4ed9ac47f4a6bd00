//! Proptest generators for property-based testing.

use proptest::prelude::*;

use crate::vectors::Field;

/// Generate plaintext bytes of specified max length.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an email id.
pub fn email_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,24}".prop_map(String::from)
}

/// Generate a set of distinct email ids.
pub fn email_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(email_id(), 0..=max).prop_map(|ids| ids.into_iter().collect())
}

/// Generate a field to tamper with.
pub fn field() -> impl Strategy<Value = Field> {
    prop_oneof![
        Just(Field::CtKem),
        Just(Field::Nonce),
        Just(Field::Aad),
        Just(Field::Ciphertext),
        Just(Field::Signature),
    ]
}

/// Parameters for sealing a payload.
#[derive(Debug, Clone)]
pub struct SealParams {
    pub plaintext: Vec<u8>,
    /// Never empty, so every field has a bit to flip.
    pub aad: Vec<u8>,
}

impl Arbitrary for SealParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (plaintext(4096), prop::collection::vec(any::<u8>(), 1..=256))
            .prop_map(|(plaintext, aad)| SealParams { plaintext, aad })
            .boxed()
    }
}
