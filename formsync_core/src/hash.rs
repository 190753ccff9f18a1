use std::{fs::File, path::Path};

use md5::{Digest, Md5};

/// Prefix OpenRosa servers put in front of md5 digests.
pub const MD5_PREFIX: &str = "md5:";

pub fn md5_file<P>(path: P) -> Result<String, std::io::Error>
where
    P: AsRef<Path>,
{
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Like [`md5_file`], but a missing or unreadable file is simply `None`.
pub fn md5_file_opt<P>(path: P) -> Option<String>
where
    P: AsRef<Path>,
{
    md5_file(path).ok()
}

pub fn md5_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// `md5:abc` becomes `abc`; unprefixed values pass through unchanged.
pub fn strip_md5_prefix(hash: &str) -> String {
    hash.trim()
        .strip_prefix(MD5_PREFIX)
        .unwrap_or(hash.trim())
        .to_string()
}

pub fn with_md5_prefix(hash: &str) -> String {
    format!("{}{}", MD5_PREFIX, hash)
}
