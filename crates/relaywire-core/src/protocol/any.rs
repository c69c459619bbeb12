//! Polymorphic `Any` container and its type registry.
//!
//! An [`AnyEnvelope`] lets one generic slot (an update item's data, an RPC
//! result, a command body) carry unrelated message shapes. The registry keeps
//! two plain maps, `TypeId -> identifier` and `identifier -> decoder`, and
//! keeps them consistent: registering again for either key replaces the old
//! pairing in both directions.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Binary encoding of a typed payload.
///
/// Every serde type gets a JSON-bytes encoding; the envelope treats the bytes
/// as opaque.
pub trait PayloadCodec: Sized + Send + 'static {
    fn encode_payload(&self) -> Result<Vec<u8>>;
    fn decode_payload(bytes: &[u8]) -> Result<Self>;
}

impl<T> PayloadCodec for T
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn encode_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| RelayError::Internal(format!("payload encode failed: {e}")))
    }

    fn decode_payload(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::BadRequest(format!("payload decode failed: {e}")))
    }
}

/// `{ typeUrl, value }` wrapper. `value` travels as base64 text in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyEnvelope {
    pub type_url: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

/// Explicit decoder accepted by [`TypeRegistry::unpack`].
pub type DecodeFn<T> = fn(&[u8]) -> Result<T>;

/// Type-erased decoder stored in the registry.
pub type ErasedDecodeFn = fn(&[u8]) -> Result<Box<dyn Any + Send>>;

fn erased_decode<T: PayloadCodec>(bytes: &[u8]) -> Result<Box<dyn Any + Send>> {
    Ok(Box::new(T::decode_payload(bytes)?))
}

#[derive(Clone, Copy)]
struct Registered {
    type_id: TypeId,
    type_name: &'static str,
    decode: ErasedDecodeFn,
}

/// Bidirectional type registry.
///
/// Built mutably at startup, then shared read-only (usually behind `Arc`).
#[derive(Default)]
pub struct TypeRegistry {
    by_type: HashMap<TypeId, String>,
    by_identifier: HashMap<String, Registered>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `T` with `identifier`. Last write wins for both keys.
    pub fn register<T: PayloadCodec>(&mut self, identifier: impl Into<String>) {
        let identifier = identifier.into();
        let type_id = TypeId::of::<T>();

        if let Some(old) = self.by_type.insert(type_id, identifier.clone()) {
            if old != identifier {
                self.by_identifier.remove(&old);
            }
        }

        let entry = Registered {
            type_id,
            type_name: std::any::type_name::<T>(),
            decode: erased_decode::<T>,
        };
        if let Some(prev) = self.by_identifier.insert(identifier.clone(), entry) {
            if prev.type_id != type_id {
                tracing::debug!(
                    identifier = %identifier,
                    replaced = prev.type_name,
                    "type identifier re-registered"
                );
                self.by_type.remove(&prev.type_id);
            }
        }
    }

    pub fn resolve_by_type<T: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    pub fn resolve_by_identifier(&self, identifier: &str) -> Option<ErasedDecodeFn> {
        self.by_identifier.get(identifier).map(|r| r.decode)
    }

    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    /// Wrap `value` using `identifier`, or the one registered for `T`.
    pub fn pack<T: PayloadCodec>(&self, value: &T, identifier: Option<&str>) -> Result<AnyEnvelope> {
        let type_url = match identifier {
            Some(id) => id.to_owned(),
            None => self
                .resolve_by_type::<T>()
                .map(str::to_owned)
                .ok_or(RelayError::UnresolvedType(std::any::type_name::<T>()))?,
        };
        Ok(AnyEnvelope {
            type_url,
            value: value.encode_payload()?,
        })
    }

    /// Decode `envelope` with `decode` if given, otherwise via the registry.
    pub fn unpack<T: PayloadCodec>(
        &self,
        envelope: &AnyEnvelope,
        decode: Option<DecodeFn<T>>,
    ) -> Result<T> {
        if let Some(f) = decode {
            return f(&envelope.value);
        }
        let erased = self.unpack_dyn(envelope)?;
        erased.downcast::<T>().map(|b| *b).map_err(|_| {
            RelayError::BadRequest(format!(
                "{} does not decode to {}",
                envelope.type_url,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Decode through the registry without knowing the concrete type.
    pub fn unpack_dyn(&self, envelope: &AnyEnvelope) -> Result<Box<dyn Any + Send>> {
        let decode = self
            .resolve_by_identifier(&envelope.type_url)
            .ok_or_else(|| RelayError::UnknownType(envelope.type_url.clone()))?;
        decode(&envelope.value)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
