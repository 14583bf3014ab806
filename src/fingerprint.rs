//! src/fingerprint.rs
//! Redukcja wiadomości do (fingerprint, punkty) przed SpamScorerem.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::ScoringWeights;

/// FNV-1a znormalizowanej treści.
pub type Fingerprint = u64;

static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ix)\b((https?://|www\.)[^\s<>()]+|discord\.gg/[A-Za-z0-9]+)"#)
        .expect("link regex")
});

fn normalize_content_for_sig(s: &str) -> String {
    // NFKC + lower, zostają litery/cyfry, spacje zwinięte do jednej
    let s = s.nfkc().collect::<String>().to_lowercase();
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if ch.is_whitespace() && !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub fn fingerprint(content: &str) -> Fingerprint {
    fnv1a64(normalize_content_for_sig(content).as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTraits {
    pub fingerprint: Fingerprint,
    pub len: usize,
    pub mentions: u32,
    pub attachments: u32,
    pub has_link: bool,
    pub mention_everyone: bool,
}

impl MessageTraits {
    pub fn from_parts(content: &str, mentions: u32, attachments: u32, mention_everyone: bool) -> Self {
        Self {
            fingerprint: fingerprint(content),
            len: content.chars().count(),
            mentions,
            attachments,
            has_link: RE_LINK.is_match(content),
            mention_everyone,
        }
    }
}

/// Ile punktów "spamowości" ma pojedyncza wiadomość.
pub fn message_points(w: &ScoringWeights, m: &MessageTraits) -> i64 {
    let mut pts = w.base;
    pts += w.per_mention * m.mentions as i64;
    pts += w.per_attachment * m.attachments as i64;
    pts += w.per_100_chars * (m.len / 100) as i64;
    if m.has_link {
        pts += w.link;
    }
    if m.mention_everyone {
        pts += w.everyone_mention;
    }
    pts.max(0)
}
