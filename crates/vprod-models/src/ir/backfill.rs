//! Structural default-fill for IR sections.
//!
//! Every IR section is declared through [`ir_section!`], which gives each
//! known field an `Option` type, a lenient deserializer and a slot for unknown
//! keys. [`Backfill`] then walks two values of the same type and inserts what
//! the caller's value lacks, never overwriting what it has.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// One-directional deep merge: fill gaps in `self` from `defaults`.
pub trait Backfill {
    fn backfill(&mut self, defaults: &Self);
}

impl<T: Backfill + Clone> Backfill for Option<T> {
    fn backfill(&mut self, defaults: &Self) {
        match self {
            Some(value) => {
                if let Some(default) = defaults {
                    value.backfill(default);
                }
            }
            None => *self = defaults.clone(),
        }
    }
}

impl Backfill for Map<String, Value> {
    fn backfill(&mut self, defaults: &Self) {
        for (key, default) in defaults {
            match self.get_mut(key) {
                Some(value) => value.backfill(default),
                None => {
                    self.insert(key.clone(), default.clone());
                }
            }
        }
    }
}

impl Backfill for Value {
    fn backfill(&mut self, defaults: &Self) {
        if let (Value::Object(map), Value::Object(default)) = (self, defaults) {
            map.backfill(default);
        }
    }
}

// Lists and scalars are atomic: present means kept as-is.
impl<T> Backfill for Vec<T> {
    fn backfill(&mut self, _defaults: &Self) {}
}

macro_rules! atomic_backfill {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Backfill for $ty {
                fn backfill(&mut self, _defaults: &Self) {}
            }
        )*
    };
}

atomic_backfill!(String, bool, f64, u32);

/// Deserialize a field, mapping any shape mismatch to `None`.
///
/// A malformed value is treated as absent so that [`Backfill`] replaces it.
/// A list that does not parse as a whole keeps the items that do; it is
/// absent only when none of them fit.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_lenient(value))
}

fn parse_lenient<T: DeserializeOwned>(value: Value) -> Option<T> {
    let Value::Array(items) = value else {
        return serde_json::from_value(value).ok();
    };
    if let Ok(parsed) = serde_json::from_value(Value::Array(items.clone())) {
        return Some(parsed);
    }

    // An item fits when a one-item list of it parses as `T`.
    let kept: Vec<Value> = items
        .into_iter()
        .filter(|item| serde_json::from_value::<T>(Value::Array(vec![item.clone()])).is_ok())
        .collect();
    if kept.is_empty() {
        return None;
    }
    serde_json::from_value(Value::Array(kept)).ok()
}

/// Declare an IR section: optional, leniently parsed fields plus preserved
/// unknown keys, with a field-wise [`Backfill`] impl.
macro_rules! ir_section {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident: $ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq,
            ::serde::Serialize, ::serde::Deserialize, ::schemars::JsonSchema,
        )]
        pub struct $name {
            $(
                $(#[$fmeta])*
                #[serde(
                    default,
                    deserialize_with = "crate::ir::lenient",
                    skip_serializing_if = "Option::is_none"
                )]
                pub $field: Option<$ty>,
            )*
            /// Keys outside the schema, kept untouched
            #[serde(flatten)]
            pub extra: ::serde_json::Map<String, ::serde_json::Value>,
        }

        impl crate::ir::Backfill for $name {
            fn backfill(&mut self, defaults: &Self) {
                $( crate::ir::Backfill::backfill(&mut self.$field, &defaults.$field); )*
                crate::ir::Backfill::backfill(&mut self.extra, &defaults.extra);
            }
        }
    };
}
