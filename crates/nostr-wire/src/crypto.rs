//! BIP-340 Schnorr signing and verification (spec §3 "Event", §6 "sig").
//!
//! Every event's `id` doubles as the 32-byte message digest that gets
//! signed: there is no separate hash-then-sign step beyond the canonical id
//! computation in [`crate::canonical`].

use crate::canonical::recompute_id;
use crate::error::{Error, Result};
use crate::types::{Event, PublicKey, Signature};
use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey};

/// A signing identity: a secp256k1 keypair reduced to its BIP-340 x-only
/// public key for Nostr purposes.
pub struct KeyPair {
    inner: Keypair,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let inner = Keypair::new(&secp, &mut rand::thread_rng());
        Self { inner }
    }

    /// Load a keypair from a 32-byte secret key.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret = secp256k1::SecretKey::from_slice(&bytes)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let inner = Keypair::from_secret_key(&secp, &secret);
        Ok(Self { inner })
    }

    /// Load a keypair from a 64-char hex-encoded secret key.
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidPublicKey("secret key not 32 bytes".into()))?;
        Self::from_secret_bytes(arr)
    }

    /// The x-only public key this keypair signs as.
    pub fn public_key(&self) -> PublicKey {
        let (xonly, _parity) = self.inner.x_only_public_key();
        PublicKey(xonly.serialize())
    }

    /// Sign a 32-byte event id, producing the event's `sig`.
    pub fn sign_id(&self, id: &[u8; 32]) -> Signature {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(*id);
        let sig = secp.sign_schnorr(&msg, &self.inner);
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(sig.as_ref());
        Signature(bytes)
    }
}

/// Verify that `event.sig` is a valid BIP-340 signature over `event.id` by
/// `event.pubkey`, after recomputing `event.id` from the event's other
/// fields. This is the full incoming-event validity check (spec §7
/// `BadId` / `BadSignature`).
pub fn verify_event(event: &Event) -> Result<()> {
    let computed = recompute_id(event);
    if computed != event.id {
        return Err(Error::BadId {
            computed: computed.to_hex(),
            transmitted: event.id.to_hex(),
        });
    }

    let secp = Secp256k1::new();
    let xonly = XOnlyPublicKey::from_slice(&event.pubkey.0)
        .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
    let msg = Message::from_digest(event.id.0);
    let sig = secp256k1::schnorr::Signature::from_slice(&event.sig.0)
        .map_err(|_| Error::BadSignature)?;
    secp.verify_schnorr(&sig, &msg, &xonly)
        .map_err(|_| Error::BadSignature)
}
