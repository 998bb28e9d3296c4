use sha2::{Digest, Sha256};

/// Decides whether a username/passphrase pair grants observer privileges.
pub trait CredentialCheck: Send + Sync {
    fn is_admin(&self, username: &str, passphrase: &str) -> bool;
}

/// The single administrative account from configuration.
///
/// Only digests are kept, and comparison runs over the full digest so the
/// time taken does not depend on how much of the input matched.
pub struct AdminCredentials {
    username: String,
    passphrase_digest: [u8; 32],
}

impl AdminCredentials {
    pub fn new(username: &str, passphrase: &str) -> Self {
        AdminCredentials {
            username: username.to_string(),
            passphrase_digest: digest(passphrase),
        }
    }
}

impl CredentialCheck for AdminCredentials {
    fn is_admin(&self, username: &str, passphrase: &str) -> bool {
        let candidate = digest(passphrase);
        let diff = candidate
            .iter()
            .zip(self.passphrase_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0 && username == self.username
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}
