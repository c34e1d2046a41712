use sha2::{
    Digest,
    Sha256,
};
use wana_kana::utils::{
    is_char_kana,
    is_char_kanji,
};

pub fn is_japanese_script(c: char) -> bool {
    is_char_kana(c) || is_char_kanji(c) || c == '々'
}

pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese_script)
}

/// True for non-empty text made only of kana and whitespace.
pub fn is_kana_only(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| is_char_kana(c) || c.is_whitespace())
}

/// Anki tags are space separated, so inner whitespace runs become `_`.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.split_whitespace().collect::<Vec<_>>().join("_");
    (!tag.is_empty()).then_some(tag)
}

/// Single-line deck name: control characters become spaces and whitespace runs collapse.
pub fn sanitize_deck_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn sound_tag(filename: &str) -> String {
    format!("[sound:{}]", filename)
}

/// Extracts every `[sound:...]` filename referenced by a field.
pub fn sound_references(field: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = field;
    while let Some(start) = rest.find("[sound:") {
        let after = &rest[start + "[sound:".len()..];
        match after.find(']') {
            Some(end) => {
                refs.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    refs
}

/// Stable media filename for synthesized speech, so identical input yields identical packages.
pub fn media_filename(kind: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("kotodeck_{}.mp3", &digest[..16])
}

/// Deterministic deck/note type id in `[2^30, 2^31)`, clear of Anki's built-in id 1.
pub fn stable_id(seed: &str) -> i64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (1 << 30) + (u64::from_be_bytes(bytes) % (1 << 30)) as i64
}
