//! BIP39 mnemonic canonicalization, validation, generation and seed
//! derivation.
//!
//! Phrases typed by users carry stray capitals and whitespace, so every
//! entry point first reduces the input to its canonical form:
//! trimmed, lower-cased, words separated by exactly one space.
//!
//! Wordlist membership and the checksum are delegated to the `bip39`
//! crate (English list, 12/15/18/21/24 words). The seed is computed
//! locally with PBKDF2-HMAC-SHA512, 2048 rounds,
//! salt = `"mnemonic" + passphrase`.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0039.mediawiki>

use bip39::Language;
use hmac::Hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use swapmesh_types::{Result, SwapMeshError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Word counts accepted by BIP39.
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

// ---------------------------------------------------------------------------
// Mnemonic
// ---------------------------------------------------------------------------

/// A validated BIP39 phrase in canonical form.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic(String);

impl Mnemonic {
    /// Canonicalizes and validates `phrase`.
    pub fn parse(phrase: &str) -> Result<Self> {
        let canonical = canonicalize_mnemonic(phrase);
        check_canonical(&canonical)?;
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn words(&self) -> Vec<&str> {
        self.0.split(' ').collect()
    }

    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

// Mnemonic does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// A 64-byte BIP39 seed. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub const LEN: usize = 64;

    /// Wraps raw seed bytes, e.g. from a test vector.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Canonical form and validation
// ---------------------------------------------------------------------------

/// Trims, lower-cases and collapses all whitespace runs to one space.
/// Tabs and line breaks count as separators too, so a phrase pasted
/// one word per line canonicalizes like a space-separated one.
///
/// Idempotent.
pub fn canonicalize_mnemonic(phrase: &str) -> String {
    phrase
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `true` if the canonical form of `phrase` is a valid English
/// BIP39 mnemonic.
pub fn mnemonic_is_valid(phrase: &str) -> bool {
    validate_mnemonic(phrase).is_ok()
}

/// Like [`mnemonic_is_valid`] but reports why the phrase was rejected.
///
/// # Errors
///
/// [`SwapMeshError::InvalidMnemonic`] on a bad word count, unknown word
/// or checksum mismatch.
pub fn validate_mnemonic(phrase: &str) -> Result<()> {
    check_canonical(&canonicalize_mnemonic(phrase))
}

fn check_canonical(canonical: &str) -> Result<()> {
    let count = if canonical.is_empty() {
        0
    } else {
        canonical.split(' ').count()
    };
    if !VALID_WORD_COUNTS.contains(&count) {
        return Err(SwapMeshError::InvalidMnemonic {
            reason: format!("expected 12, 15, 18, 21 or 24 words, got {count}"),
        });
    }

    bip39::Mnemonic::parse_in_normalized(Language::English, canonical)
        .map(|_| ())
        .map_err(|e| SwapMeshError::InvalidMnemonic {
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a fresh random mnemonic with `word_count` words.
///
/// Entropy is drawn from the OS CSPRNG: `word_count * 4 / 3` bytes.
pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic> {
    if !VALID_WORD_COUNTS.contains(&word_count) {
        return Err(SwapMeshError::InvalidMnemonic {
            reason: format!("cannot generate a {word_count}-word mnemonic"),
        });
    }

    let mut entropy = vec![0u8; word_count * 4 / 3];
    OsRng.fill_bytes(&mut entropy);

    let result = entropy_to_mnemonic(&entropy);

    entropy.zeroize();
    result
}

/// Converts raw entropy (16..=32 bytes, multiple of 4) into a mnemonic.
pub fn entropy_to_mnemonic(entropy: &[u8]) -> Result<Mnemonic> {
    let phrase = bip39::Mnemonic::from_entropy(entropy).map_err(|e| {
        SwapMeshError::CryptoError {
            reason: format!("BIP39 entropy rejected: {e}"),
        }
    })?;
    Ok(Mnemonic(phrase.to_string()))
}

// ---------------------------------------------------------------------------
// Seed derivation
// ---------------------------------------------------------------------------

/// Derives the 64-byte seed from a mnemonic and optional passphrase.
///
/// The mnemonic is used as given; callers pass the canonical form.
pub fn mnemonic_to_seed(mnemonic: &str, passphrase: &str) -> Result<Seed> {
    let mut salt = Vec::with_capacity(8 + passphrase.len());
    salt.extend_from_slice(b"mnemonic");
    salt.extend_from_slice(passphrase.as_bytes());

    let mut output = [0u8; 64];

    pbkdf2::pbkdf2::<Hmac<Sha512>>(mnemonic.as_bytes(), &salt, 2048, &mut output).map_err(
        |e| SwapMeshError::CryptoError {
            reason: format!("PBKDF2-HMAC-SHA512 failed: {e}"),
        },
    )?;

    salt.zeroize();

    Ok(Seed(output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                         abandon abandon abandon abandon abandon about";

    #[test]
    fn canonicalize_collapses_whitespace_and_case() {
        let messy = "  Abandon\tABANDON  abandon\n\nabandon abandon abandon \
                     abandon abandon abandon abandon abandon   About  ";
        assert_eq!(canonicalize_mnemonic(messy), ABOUT);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_mnemonic("  Zoo  ZOO\tzoo ");
        assert_eq!(canonicalize_mnemonic(&once), once);
        assert_eq!(once, "zoo zoo zoo");
    }

    #[test]
    fn canonicalize_empty_input() {
        assert_eq!(canonicalize_mnemonic(" \t\n "), "");
    }

    #[test]
    fn valid_12_word_phrase_accepted() {
        assert!(mnemonic_is_valid(ABOUT));
        assert!(mnemonic_is_valid(&ABOUT.to_uppercase()));
    }

    #[test]
    fn valid_24_word_phrase_accepted() {
        let phrase = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon art";
        assert!(mnemonic_is_valid(phrase));
    }

    #[test]
    fn altered_checksum_word_rejected() {
        // "about" carries the checksum; any other final word breaks it.
        let altered = ABOUT.replace("about", "abandon");
        assert!(!mnemonic_is_valid(&altered));
        assert!(matches!(
            validate_mnemonic(&altered),
            Err(SwapMeshError::InvalidMnemonic { .. })
        ));
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(!mnemonic_is_valid("abandon abandon abandon"));
        assert!(!mnemonic_is_valid(""));
    }

    #[test]
    fn unknown_word_rejected() {
        let bad = ABOUT.replacen("abandon", "notaword", 1);
        assert!(!mnemonic_is_valid(&bad));
    }

    #[test]
    fn parse_stores_canonical_form() -> std::result::Result<(), SwapMeshError> {
        let m = Mnemonic::parse(&format!("  {}  ", ABOUT.to_uppercase()))?;
        assert_eq!(m.as_str(), ABOUT);
        assert_eq!(m.word_count(), 12);
        Ok(())
    }

    #[test]
    fn generated_mnemonics_validate() -> std::result::Result<(), SwapMeshError> {
        for count in VALID_WORD_COUNTS {
            let m = generate_mnemonic(count)?;
            assert_eq!(m.word_count(), count);
            validate_mnemonic(m.as_str())?;
        }
        Ok(())
    }

    #[test]
    fn generate_rejects_odd_word_count() {
        assert!(generate_mnemonic(13).is_err());
    }

    #[test]
    fn entropy_all_zeros_16_bytes() -> std::result::Result<(), SwapMeshError> {
        let m = entropy_to_mnemonic(&[0u8; 16])?;
        assert_eq!(m.as_str(), ABOUT);
        Ok(())
    }

    /// TREZOR vector: all-zero 128-bit entropy, passphrase "TREZOR".
    #[test]
    fn seed_trezor_vector() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let seed = mnemonic_to_seed(ABOUT, "TREZOR")?;
        let expected = hex::decode(
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e5349553\
             1f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04",
        )?;
        assert_eq!(seed.as_bytes().as_slice(), expected.as_slice());
        Ok(())
    }

    #[test]
    fn seed_empty_passphrase_vector() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let seed = mnemonic_to_seed(ABOUT, "")?;
        let expected = hex::decode(
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4",
        )?;
        assert_eq!(seed.as_bytes().as_slice(), expected.as_slice());
        Ok(())
    }
}
