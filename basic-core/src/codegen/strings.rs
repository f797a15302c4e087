//! String literal interning and data-section emission (spec.md §4.3).
//!
//! Only the compile-time literal path is this module's job: encoding a
//! literal's bytes and emitting its descriptor init. The live descriptor
//! pool, refcounting, and mutation are runtime-side and out of scope
//! (spec.md §4.3 "Generator obligations").

/// Encoding chosen for one string literal, per spec.md §4.3 offset-28
/// `encoding` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Ascii = 0,
    Utf32 = 1,
}

/// Picks ASCII when every code point fits in 7 bits (spec.md §4.3 "String
/// literals are converted at compile time to UTF-32 (or ASCII if all code
/// points <128)"), otherwise UTF-32.
pub fn choose_encoding(literal: &str) -> StringEncoding {
    if literal.chars().all(|c| (c as u32) < 128) {
        StringEncoding::Ascii
    } else {
        StringEncoding::Utf32
    }
}

/// One interned literal: its QBE data-section label, encoding, and raw
/// bytes as they should appear in the `data $str.<n>` definition.
#[derive(Debug, Clone)]
pub struct InternedLiteral {
    pub label: String,
    pub encoding: StringEncoding,
    pub text: String,
}

/// First-use-order string literal table (spec.md §5 "String literals
/// appear in the data section in first-use order").
#[derive(Debug, Default)]
pub struct LiteralPool {
    by_text: std::collections::HashMap<String, usize>,
    literals: Vec<InternedLiteral>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning its (possibly newly assigned) data label.
    /// Identical literals share a label, deduplicating descriptor init.
    pub fn intern(&mut self, text: &str) -> String {
        if let Some(&idx) = self.by_text.get(text) {
            return self.literals[idx].label.clone();
        }
        let idx = self.literals.len();
        let label = format!("$str.{idx}");
        self.literals.push(InternedLiteral {
            label: label.clone(),
            encoding: choose_encoding(text),
            text: text.to_string(),
        });
        self.by_text.insert(text.to_string(), idx);
        label
    }

    pub fn entries(&self) -> &[InternedLiteral] {
        &self.literals
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }
}

/// Renders one literal's raw byte buffer plus its 40-byte descriptor
/// record (spec.md §4.3 "the descriptor allocated and initialized at
/// program start"): `data@0`, `length@8`, `capacity@16`, `refcount@24`,
/// `encoding@28`, `dirty@29`, 2 bytes padding, `utf8_cache@32`. ASCII
/// buffers are emitted as a `b`yte string with a NUL terminator; UTF-32
/// buffers as a sequence of 4-byte little-endian `w` words, since QBE's
/// `data` directive has no native UTF-32 string syntax. A literal's
/// `utf8_cache` starts null; the runtime populates it lazily the first
/// time one is needed and a non-ASCII literal is read as UTF-8.
pub fn render_literal_data(lit: &InternedLiteral) -> String {
    let bytes_label = format!("{}.bytes", lit.label);
    let char_count = lit.text.chars().count();
    let (buffer, encoding_tag) = match lit.encoding {
        StringEncoding::Ascii => (
            format!("data {bytes_label} = {{ b \"{}\", b 0 }}\n", escape_ascii(&lit.text)),
            0,
        ),
        StringEncoding::Utf32 => {
            let words: Vec<String> = lit.text.chars().map(|c| format!("w {}", c as u32)).collect();
            (
                format!("data {bytes_label} = {{ {}, w 0 }}\n", words.join(", ")),
                1,
            )
        }
    };

    let descriptor = format!(
        "data {} = {{ l {bytes_label}, l {char_count}, l {char_count}, w 1, b {encoding_tag}, b 0, b 0, b 0, l 0 }}\n",
        lit.label
    );

    format!("{buffer}{descriptor}")
}

fn escape_ascii(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_literal_chosen_for_plain_text() {
        assert_eq!(choose_encoding("hello"), StringEncoding::Ascii);
    }

    #[test]
    fn utf32_chosen_when_non_ascii_present() {
        assert_eq!(choose_encoding("héllo"), StringEncoding::Utf32);
    }

    #[test]
    fn interning_dedupes_identical_literals() {
        let mut pool = LiteralPool::new();
        let a = pool.intern("same");
        let b = pool.intern("same");
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn interning_assigns_labels_in_first_use_order() {
        let mut pool = LiteralPool::new();
        assert_eq!(pool.intern("first"), "$str.0");
        assert_eq!(pool.intern("second"), "$str.1");
    }
}
