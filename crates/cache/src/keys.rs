use common::Fingerprint;

/// Deterministic key built from named parts.
///
/// Parts are hashed in insertion order together with their names, so
/// `("a", "1")` and `("b", "1")` never collide.
#[derive(Clone, Default)]
pub struct CacheKey {
    fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, name: &str, value: impl AsRef<[u8]>) -> Self {
        self.fingerprint = self.fingerprint.part(name).part(value);
        self
    }

    pub fn list<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let values: Vec<S> = values.into_iter().collect();
        self.fingerprint = self
            .fingerprint
            .part(name)
            .part((values.len() as u64).to_le_bytes())
            .parts(values);
        self
    }

    /// Hex SHA-256.
    pub fn build(self) -> String {
        self.fingerprint.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic_and_name_sensitive() {
        let a = CacheKey::new().part("content", "abc").part("kind", "triage").build();
        let b = CacheKey::new().part("content", "abc").part("kind", "triage").build();
        let c = CacheKey::new().part("content", "abc").part("kind", "analysis").build();
        let d = CacheKey::new().part("other", "abc").part("kind", "triage").build();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_list_boundaries() {
        let a = CacheKey::new().list("p", ["ab", "c"]).build();
        let b = CacheKey::new().list("p", ["a", "bc"]).build();
        assert_ne!(a, b);
    }
}
