//! Mock instances for design-time preview
//!
//! Fills a struct instance with plausible, deterministic sample values so
//! bindings can be previewed before any producer exists. The same schema and
//! seed always produce the same bytes.

use crate::schema::{FieldKind, Schema};
use crate::types::TypedValue;
use crate::view::StructInstance;
use std::sync::Arc;

/// Sample words for string fields
const WORDS: &[&str] = &[
    "Ayla", "Brin", "Corvus", "Dara", "Ember", "Fenn", "Gale", "Hollow", "Iris", "Juno", "Kestrel",
    "Lumen",
];

/// xorshift64 generator
struct SampleRng(u64);

impl SampleRng {
    fn new(seed: u64) -> Self {
        // xorshift is stuck at zero, so never start there
        Self((seed ^ 0x9E37_79B9_7F4A_7C15).max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        s
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// A default instance of `schema` with every field set to a sample value
pub fn mock_instance(schema: &Arc<Schema>, seed: u64) -> StructInstance {
    let mut rng = SampleRng::new(seed);
    fill(schema, &mut rng)
}

fn fill(schema: &Arc<Schema>, rng: &mut SampleRng) -> StructInstance {
    let mut instance = StructInstance::zeroed(schema.clone());
    let mut view = instance.view_mut();
    for (index, field) in schema.fields().iter().enumerate() {
        let value = sample(&field.kind, rng);
        if let Err(e) = view.write_field(index, &value) {
            tracing::debug!("Leaving {}.{} at default: {}", schema.name(), field.name, e);
        }
    }
    instance
}

fn sample(kind: &FieldKind, rng: &mut SampleRng) -> TypedValue {
    match kind {
        FieldKind::Int { signed: true, .. } => TypedValue::Int(rng.below(101) as i64 - 50),
        FieldKind::Int { signed: false, .. } => TypedValue::Int(rng.below(101) as i64),
        FieldKind::Float { .. } => TypedValue::Float(rng.below(10_000) as f64 / 100.0),
        FieldKind::Bool => TypedValue::Bool(rng.below(2) == 1),
        FieldKind::String { capacity } => {
            let word = WORDS[rng.below(WORDS.len() as u64) as usize];
            TypedValue::String(word[..word.len().min(*capacity)].to_string())
        }
        FieldKind::Enum { def, .. } => {
            let value = match def.variants.len() {
                0 => 0,
                n => def.variants[rng.below(n as u64) as usize].value,
            };
            TypedValue::Enum(value)
        }
        FieldKind::Struct(nested) => TypedValue::Struct(fill(nested, rng).to_value()),
        FieldKind::Array { element, count, .. } => {
            TypedValue::Array((0..*count).map(|_| sample(element, rng)).collect())
        }
    }
}
