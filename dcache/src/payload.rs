//! Payload marshalling between caller values and cached bytes.
//!
//! Values are stored in a tiered representation: absent values become empty
//! bytes, raw byte sequences and strings are stored verbatim, and everything
//! else goes through the MessagePack codec via the [`MsgPack`] wrapper. The
//! tiers keep string and byte payloads readable in the store and make the
//! local-cache copy byte-identical to the remote payload.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::CacheError;

/// A value that can be stored in and read back from the cache.
///
/// Implementations exist for:
///
/// - `()` — encodes to empty bytes, decodes from anything.
/// - `Option<T>` — `None` encodes to empty bytes; empty bytes decode to
///   `None`. This is the absent-value tier.
/// - `Vec<u8>` / [`Bytes`] — stored verbatim; decoding yields a fresh copy.
/// - `String` — stored as its raw UTF-8 bytes.
/// - [`MsgPack<T>`] — any `Serialize + DeserializeOwned` value, encoded
///   with the MessagePack codec.
pub trait Payload: Sized + Send {
    /// Encode the value into its stored byte representation.
    fn marshal(&self) -> Result<Bytes, CacheError>;

    /// Decode a value from its stored byte representation.
    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError>;
}

impl Payload for () {
    fn marshal(&self) -> Result<Bytes, CacheError> {
        Ok(Bytes::new())
    }

    fn unmarshal(_raw: &[u8]) -> Result<Self, CacheError> {
        Ok(())
    }
}

impl Payload for Bytes {
    fn marshal(&self) -> Result<Bytes, CacheError> {
        Ok(self.clone())
    }

    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError> {
        Ok(Bytes::copy_from_slice(raw))
    }
}

impl Payload for Vec<u8> {
    fn marshal(&self) -> Result<Bytes, CacheError> {
        Ok(Bytes::copy_from_slice(self))
    }

    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError> {
        Ok(raw.to_vec())
    }
}

impl Payload for String {
    fn marshal(&self) -> Result<Bytes, CacheError> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError> {
        String::from_utf8(raw.to_vec()).map_err(CacheError::codec)
    }
}

/// `None` is the absent tier: it marshals to empty bytes, and empty bytes
/// unmarshal to `None`. An inner value that itself marshals to empty bytes
/// (such as the empty string) is indistinguishable from `None` on read.
impl<T: Payload> Payload for Option<T> {
    fn marshal(&self) -> Result<Bytes, CacheError> {
        match self {
            None => Ok(Bytes::new()),
            Some(value) => value.marshal(),
        }
    }

    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError> {
        if raw.is_empty() {
            return Ok(None);
        }
        T::unmarshal(raw).map(Some)
    }
}

/// Wrapper marking a value for MessagePack encoding.
///
/// Use this for any structured value; the tiers above only cover bytes,
/// strings, and absence.
///
/// ```
/// use dcache::{MsgPack, Payload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// let value = MsgPack(User { name: "a".into() });
/// let raw = value.marshal().unwrap();
/// let back = MsgPack::<User>::unmarshal(&raw).unwrap();
/// assert_eq!(back.0, value.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgPack<T>(pub T);

impl<T> MsgPack<T> {
    /// Consumes the wrapper and returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Payload for MsgPack<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn marshal(&self) -> Result<Bytes, CacheError> {
        let raw = rmp_serde::to_vec_named(&self.0).map_err(CacheError::codec)?;
        Ok(Bytes::from(raw))
    }

    fn unmarshal(raw: &[u8]) -> Result<Self, CacheError> {
        if raw.is_empty() {
            return Err(CacheError::Nil);
        }
        rmp_serde::from_slice(raw).map(MsgPack).map_err(CacheError::codec)
    }
}
