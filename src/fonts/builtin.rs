//! Builtin Helvetica metrics, used when no font file is configured.
//!
//! The base-14 fonts need no embedded program, only a width table for
//! layout. Coverage is limited to WinAnsi-encodable characters; anything
//! outside it is a missing glyph, same as with a real font file.

/// Widths of the printable ASCII range (0x20..=0x7E) in 1/1000 em.
#[rustfmt::skip]
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// A base-14 font referenced by name.
#[derive(Debug)]
pub struct BuiltinFont {
    /// PostScript base font name (`Helvetica`).
    pub base_name: &'static str,
}

impl BuiltinFont {
    pub fn helvetica() -> Self {
        Self {
            base_name: "Helvetica",
        }
    }

    /// Advance width of `c` in 1/1000 em, or `None` outside coverage.
    pub fn char_width(&self, c: char) -> Option<u16> {
        let code = c as u32;
        if (0x20..=0x7E).contains(&code) {
            return Some(ASCII_WIDTHS[(code - 0x20) as usize]);
        }
        latin1_width(c)
    }

    /// WinAnsi code for `c`. Callers validate coverage via
    /// [`char_width`](Self::char_width) first; unmapped characters encode
    /// as space.
    pub fn encode_char(&self, c: char) -> u8 {
        let code = c as u32;
        if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
            code as u8
        } else {
            b' '
        }
    }
}

/// Widths for the Latin-1 supplement (WinAnsi maps it identically).
fn latin1_width(c: char) -> Option<u16> {
    let code = c as u32;
    match code {
        // Accented capitals share their base letter's width.
        0xC0..=0xC5 => Some(667),        // À..Å
        0xC6 => Some(1000),              // Æ
        0xC7 => Some(722),               // Ç
        0xC8..=0xCB => Some(667),        // È..Ë
        0xCC..=0xCF => Some(278),        // Ì..Ï
        0xD0 => Some(722),               // Ð
        0xD1 => Some(722),               // Ñ
        0xD2..=0xD6 | 0xD8 => Some(778), // Ò..Ö, Ø
        0xD7 => Some(584),               // ×
        0xD9..=0xDC => Some(722),        // Ù..Ü
        0xDD => Some(667),               // Ý
        0xDE => Some(667),               // Þ
        0xDF => Some(611),               // ß
        0xE0..=0xE5 => Some(556),        // à..å
        0xE6 => Some(889),               // æ
        0xE7 => Some(500),               // ç
        0xE8..=0xEB => Some(556),        // è..ë
        0xEC..=0xEF => Some(278),        // ì..ï
        0xF0 => Some(556),               // ð
        0xF1 => Some(556),               // ñ
        0xF2..=0xF6 | 0xF8 => Some(556), // ò..ö, ø
        0xF7 => Some(584),               // ÷
        0xF9..=0xFC => Some(556),        // ù..ü
        0xFD | 0xFF => Some(500),        // ý, ÿ
        0xFE => Some(556),               // þ
        0xA0 => Some(278),               // nbsp
        0xA1 => Some(333),               // ¡
        0xA2..=0xA5 => Some(556),        // ¢£¤¥
        0xA6 => Some(260),               // ¦
        0xA7 => Some(556),               // §
        0xA8 => Some(333),               // ¨
        0xA9 | 0xAE => Some(737),        // © ®
        0xAA => Some(370),               // ª
        0xAB | 0xBB => Some(556),        // « »
        0xAC | 0xB1 => Some(584),        // ¬ ±
        0xAD | 0xAF | 0xB4 | 0xB8 => Some(333),
        0xB0 => Some(400),               // °
        0xB2 | 0xB3 | 0xB9 => Some(333), // ² ³ ¹
        0xB5 => Some(556),               // µ
        0xB6 => Some(537),               // ¶
        0xB7 => Some(278),               // ·
        0xBA => Some(365),               // º
        0xBC..=0xBE => Some(834),        // ¼ ½ ¾
        0xBF => Some(611),               // ¿
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_widths() {
        let font = BuiltinFont::helvetica();
        assert_eq!(font.char_width(' '), Some(278));
        assert_eq!(font.char_width('W'), Some(944));
        assert_eq!(font.char_width('i'), Some(222));
        assert_eq!(font.char_width('@'), Some(1015));
    }

    #[test]
    fn test_latin1_coverage() {
        let font = BuiltinFont::helvetica();
        assert_eq!(font.char_width('é'), Some(556));
        assert_eq!(font.char_width('ß'), Some(611));
    }

    #[test]
    fn test_outside_coverage() {
        let font = BuiltinFont::helvetica();
        assert_eq!(font.char_width('日'), None);
        assert_eq!(font.char_width('€'), None);
    }

    #[test]
    fn test_encoding() {
        let font = BuiltinFont::helvetica();
        assert_eq!(font.encode_char('A'), b'A');
        assert_eq!(font.encode_char('é'), 0xE9);
    }
}
