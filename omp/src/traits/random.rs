//! Source of key material for simulated nodes.

/// Random bytes on demand.
///
/// Key material in the simulated node is drawn from here, so tests can pin
/// every generated key with a seeded source.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);

    /// 32 bytes, e.g. a signing key seed.
    fn random_bytes_32(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.fill_bytes(&mut bytes);
        bytes
    }
}
