use std::collections::BTreeSet;

use crate::profiles::normalize_profile_name;

/// One `@<name>:` routing token found in query text. The span covers
/// the whole token, leading `@` and trailing `:` included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationMatch {
    /// Captured name, normalized to lower-case.
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationScan {
    /// All non-overlapping matches in textual order.
    pub occurrences: Vec<AnnotationMatch>,
    /// Distinct normalized names; cardinality drives the dispatcher's
    /// zero/one/many policy.
    pub distinct_names: BTreeSet<String>,
}

impl AnnotationScan {
    #[must_use]
    pub fn single_target(&self) -> Option<&AnnotationMatch> {
        if self.distinct_names.len() == 1 {
            self.occurrences.first()
        } else {
            None
        }
    }
}

/// Editor widgets emit U+2029 as the line separator; the rest of the
/// pipeline only understands `\n`.
#[must_use]
pub fn normalize_input(text: &str) -> String {
    text.replace('\u{2029}', "\n")
}

/// Scans for non-overlapping `@<name>:` tokens. A name is one or more
/// characters excluding `:`, and a token never spans a line break.
#[must_use]
pub fn scan(text: &str) -> AnnotationScan {
    let mut occurrences = Vec::new();
    let mut distinct_names = BTreeSet::new();

    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'@' {
            index += 1;
            continue;
        }

        match token_end(bytes, index) {
            Some(end) => {
                let name = normalize_profile_name(&text[index + 1..end - 1]);
                distinct_names.insert(name.clone());
                occurrences.push(AnnotationMatch {
                    name,
                    start: index,
                    end,
                });
                index = end;
            }
            None => index += 1,
        }
    }

    AnnotationScan {
        occurrences,
        distinct_names,
    }
}

/// Returns the exclusive end of a token starting at `start` (the `@`),
/// or `None` when no `:` follows at least one name character on the
/// same line.
fn token_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut cursor = start + 1;
    while cursor < bytes.len() {
        match bytes[cursor] {
            b':' if cursor > start + 1 => return Some(cursor + 1),
            b':' | b'\n' | b'\r' => return None,
            _ => cursor += 1,
        }
    }
    None
}

/// Removes exactly one occurrence from the text. Callers pass the first
/// occurrence even when the same name is annotated repeatedly; any
/// later duplicate stays embedded in the residual query.
#[must_use]
pub fn strip_occurrence(text: &str, occurrence: &AnnotationMatch) -> String {
    let mut residual = String::with_capacity(text.len());
    residual.push_str(&text[..occurrence.start]);
    residual.push_str(&text[occurrence.end..]);
    residual
}
