// crates/core/src/transform.rs
//! Deterministic string transform the worker streams out unit by unit.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::TransformError;

/// Pure function from input text to the text that gets streamed.
pub trait StringTransform: Send + Sync {
    fn transform(&self, input: &str) -> Result<String, TransformError>;
}

/// `<char><count>...` for every distinct character in code-point order, then
/// `/`, then the base64 of the UTF-8 input.
///
/// `"Hello, World!"` becomes `" 1!1,1H1W1d1e1l3o2r1/SGVsbG8sIFdvcmxkIQ=="`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrequencyEncoder;

impl StringTransform for FrequencyEncoder {
    fn transform(&self, input: &str) -> Result<String, TransformError> {
        if input.is_empty() {
            return Err(TransformError::EmptyInput);
        }

        let mut counts: BTreeMap<char, usize> = BTreeMap::new();
        for c in input.chars() {
            *counts.entry(c).or_default() += 1;
        }

        let mut out = String::with_capacity(counts.len() * 2 + input.len() * 4 / 3 + 4);
        for (c, n) in counts {
            out.push(c);
            out.push_str(&n.to_string());
        }
        out.push('/');
        out.push_str(&STANDARD.encode(input.as_bytes()));
        Ok(out)
    }
}
