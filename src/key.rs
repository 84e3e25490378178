//! Packed island key: a 40-bit integer encoding `(typeId, propsId, flags)`,
//! plus its two text representations — a base-36 wire form and a
//! human-authorable debug form.

use regex::Regex;
use std::sync::OnceLock;

use crate::core::errors::EngineError;

/// `typeId` occupies the low 12 bits, `propsId` the next 20, `flags` the top 8
/// (spec §3, §6: "Layout LSB->MSB: typeId(12) | propsId(20) | flags(8)").
const TYPE_ID_BITS: u32 = 12;
const PROPS_ID_BITS: u32 = 20;
const FLAGS_BITS: u32 = 8;
const TYPE_ID_MASK: u64 = (1 << TYPE_ID_BITS) - 1;
const PROPS_ID_MASK: u64 = (1 << PROPS_ID_BITS) - 1;
const FLAGS_MASK: u64 = (1 << FLAGS_BITS) - 1;
const TOTAL_BITS: u32 = TYPE_ID_BITS + PROPS_ID_BITS + FLAGS_BITS;
const MAX_VALUE: u64 = (1u64 << TOTAL_BITS) - 1;

/// Island flag bits (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    PrefetchSafe = 1,
    HydrateOnEventOnly = 2,
    Critical = 4,
    NavLike = 8,
}

/// A packed island key. `IslandKey::NONE` (value 0) denotes "no key" and is
/// never produced by [`IslandKey::pack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IslandKey(u64);

impl IslandKey {
    /// The sentinel "no key" value.
    pub const NONE: Self = Self(0);

    /// Pack `(type_id, props_id, flags)` into a key. Returns `None` if
    /// `type_id` is 0 (spec: `typeId` ∈ [1, 2¹²−1], 0 is the invalid
    /// sentinel) or any field overflows its bit width.
    #[must_use]
    pub fn pack(type_id: u16, props_id: u32, flags: u8) -> Option<Self> {
        if type_id == 0 || u64::from(type_id) > TYPE_ID_MASK || u64::from(props_id) > PROPS_ID_MASK
        {
            return None;
        }
        let packed = u64::from(type_id)
            | (u64::from(props_id) << TYPE_ID_BITS)
            | (u64::from(flags) << (TYPE_ID_BITS + PROPS_ID_BITS));
        Some(Self(packed))
    }

    /// Unpack into `(type_id, props_id, flags)`.
    #[must_use]
    pub fn unpack(self) -> (u16, u32, u8) {
        let type_id = (self.0 & TYPE_ID_MASK) as u16;
        let props_id = ((self.0 >> TYPE_ID_BITS) & PROPS_ID_MASK) as u32;
        let flags = ((self.0 >> (TYPE_ID_BITS + PROPS_ID_BITS)) & FLAGS_MASK) as u8;
        (type_id, props_id, flags)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn has_flag(self, flag: Flag) -> bool {
        let (_, _, flags) = self.unpack();
        flags & (flag as u8) != 0
    }

    /// Encode as the canonical base-36 wire form.
    #[must_use]
    pub fn to_wire(self) -> String {
        to_base36(self.0)
    }

    /// Decode a base-36 wire string. Rejects non-integers, overflow, and
    /// whitespace-only/empty input; never panics.
    #[must_use]
    pub fn try_from_wire(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || !trimmed.bytes().any(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        let value = from_base36(trimmed)?;
        if value == 0 || value > MAX_VALUE {
            return None;
        }
        Some(Self(value))
    }

    /// Like [`IslandKey::try_from_wire`], but for callers (authoring/debug
    /// tools) that want a hard failure instead of a silent `None` on
    /// malformed input.
    pub fn try_decode_strict(text: &str) -> Result<Self, EngineError> {
        Self::try_from_wire(text).ok_or_else(|| EngineError::InvalidKey {
            details: format!("{text:?} is not a valid base-36 island key"),
        })
    }

    /// Parse the human-authorable debug text format: comma- or
    /// space-separated `key=value` pairs with aliases `{t|type}`, `{p|props}`,
    /// `{f|flags}`. Unknown pairs are ignored; missing fields default to 0.
    /// The parsed triple is re-packed through [`IslandKey::pack`] so both text
    /// forms yield identical keys.
    #[must_use]
    pub fn try_from_debug_text(text: &str) -> Option<Self> {
        // Cheap byte scan before paying for the regex: no '=' means no pairs.
        memchr::memchr(b'=', text.as_bytes())?;
        let mut type_id: u32 = 0;
        let mut props_id: u32 = 0;
        let mut flags: u32 = 0;
        for capture in debug_pair_pattern().captures_iter(text) {
            let field = capture[1].to_ascii_lowercase();
            let Ok(value) = capture[2].parse::<u64>() else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation)]
            let value = value.min(u64::from(u32::MAX)) as u32;
            match field.as_str() {
                "t" | "type" => type_id = value,
                "p" | "props" => props_id = value,
                "f" | "flags" => flags = value,
                _ => {}
            }
        }
        let type_id = u16::try_from(type_id).ok()?;
        let flags = u8::try_from(flags).ok()?;
        Self::pack(type_id, props_id, flags)
    }
}

fn debug_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(t|type|p|props|f|flags)\s*=\s*(\d+)").expect("static regex is valid")
    })
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(13);
    while value > 0 {
        let digit = (value % 36) as usize;
        digits.push(BASE36_DIGITS[digit]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ASCII")
}

fn from_base36(text: &str) -> Option<u64> {
    let mut value: u64 = 0;
    for byte in text.bytes() {
        let digit = match byte {
            b'0'..=b'9' => u64::from(byte - b'0'),
            b'a'..=b'z' => u64::from(byte - b'a') + 10,
            b'A'..=b'Z' => u64::from(byte - b'A') + 10,
            _ => return None,
        };
        value = value.checked_mul(36)?.checked_add(digit)?;
    }
    Some(value)
}
