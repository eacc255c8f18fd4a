// Simbind Key Type
// Keyboard scan codes (Linux input-event-codes numbering) for key actions

use std::fmt;
use std::str::FromStr;

/// Represents a single keyboard key code.
///
/// The numeric values match Linux input-event-codes.h definitions so the
/// uinput backend can emit them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Key(pub u16);

/// Prefix used when a code has no symbolic name
const CODE_PREFIX: &str = "code:";

static KEY_NAMES: &[(&str, u16)] = &[
    ("ESC", 1),
    ("ESCAPE", 1),
    ("KEY_1", 2),
    ("KEY_2", 3),
    ("KEY_3", 4),
    ("KEY_4", 5),
    ("KEY_5", 6),
    ("KEY_6", 7),
    ("KEY_7", 8),
    ("KEY_8", 9),
    ("KEY_9", 10),
    ("KEY_0", 11),
    ("MINUS", 12),
    ("EQUAL", 13),
    ("BACKSPACE", 14),
    ("TAB", 15),
    ("Q", 16),
    ("W", 17),
    ("E", 18),
    ("R", 19),
    ("T", 20),
    ("Y", 21),
    ("U", 22),
    ("I", 23),
    ("O", 24),
    ("P", 25),
    ("LEFT_BRACE", 26),
    ("RIGHT_BRACE", 27),
    ("ENTER", 28),
    ("LEFT_CTRL", 29),
    ("A", 30),
    ("S", 31),
    ("D", 32),
    ("F", 33),
    ("G", 34),
    ("H", 35),
    ("J", 36),
    ("K", 37),
    ("L", 38),
    ("SEMICOLON", 39),
    ("APOSTROPHE", 40),
    ("GRAVE", 41),
    ("LEFT_SHIFT", 42),
    ("BACKSLASH", 43),
    ("Z", 44),
    ("X", 45),
    ("C", 46),
    ("V", 47),
    ("B", 48),
    ("N", 49),
    ("M", 50),
    ("COMMA", 51),
    ("DOT", 52),
    ("SLASH", 53),
    ("RIGHT_SHIFT", 54),
    ("KPASTERISK", 55),
    ("LEFT_ALT", 56),
    ("SPACE", 57),
    ("CAPSLOCK", 58),
    ("F1", 59),
    ("F2", 60),
    ("F3", 61),
    ("F4", 62),
    ("F5", 63),
    ("F6", 64),
    ("F7", 65),
    ("F8", 66),
    ("F9", 67),
    ("F10", 68),
    ("NUMLOCK", 69),
    ("SCROLLLOCK", 70),
    ("KP7", 71),
    ("KP8", 72),
    ("KP9", 73),
    ("KPMINUS", 74),
    ("KP4", 75),
    ("KP5", 76),
    ("KP6", 77),
    ("KPPLUS", 78),
    ("KP1", 79),
    ("KP2", 80),
    ("KP3", 81),
    ("KP0", 82),
    ("KPDOT", 83),
    ("F11", 87),
    ("F12", 88),
    ("KPENTER", 96),
    ("RIGHT_CTRL", 97),
    ("KPSLASH", 98),
    ("SYSRQ", 99),
    ("RIGHT_ALT", 100),
    ("HOME", 102),
    ("UP", 103),
    ("PAGE_UP", 104),
    ("LEFT", 105),
    ("RIGHT", 106),
    ("END", 107),
    ("DOWN", 108),
    ("PAGE_DOWN", 109),
    ("INSERT", 110),
    ("DELETE", 111),
    ("PAUSE", 119),
    ("LEFT_META", 125),
    ("RIGHT_META", 126),
    ("F13", 183),
    ("F14", 184),
    ("F15", 185),
    ("F16", 186),
    ("F17", 187),
    ("F18", 188),
    ("F19", 189),
    ("F20", 190),
    ("F21", 191),
    ("F22", 192),
    ("F23", 193),
    ("F24", 194),
];

impl Key {
    /// Get the raw numeric code value
    pub fn code(self) -> u16 {
        self.0
    }

    /// Symbolic name, if the code has one
    pub fn name(self) -> Option<&'static str> {
        KEY_NAMES
            .iter()
            .find(|(_, code)| *code == self.0)
            .map(|(name, _)| *name)
    }

    /// Parse a key name (case-insensitive), a bare code or a `code:<n>` literal
    pub fn from_name(name: &str) -> Option<Key> {
        let trimmed = name.trim();
        if let Some(code) = trimmed.strip_prefix(CODE_PREFIX) {
            return code.trim().parse::<u16>().ok().map(Key);
        }
        if let Ok(code) = trimmed.parse::<u16>() {
            return Some(Key(code));
        }
        let upper = trimmed.to_uppercase();
        KEY_NAMES
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, code)| Key(*code))
    }
}

impl From<u16> for Key {
    fn from(code: u16) -> Self {
        Key(code)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}{}", CODE_PREFIX, self.0),
        }
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_name(s).ok_or_else(|| format!("unknown key '{}'", s))
    }
}
