//! Lua pattern matching (spec.md §4.6, `string.find`/`match`/`gmatch`/
//! `gsub`).
//!
//! Pattern syntax: character classes (`%a %c %d %g %l %p %s %u %w %x`,
//! uppercase inverted), `.`, sets `[...]`/`[^...]`, quantifiers
//! `* + - ?`, captures `(...)` and position captures `()`, anchors
//! `^ $`, balanced match `%bxy`, and back-references `%1`-`%9`.

mod matcher;
mod parser;

pub use matcher::{find, match_at, next_match, MatchResult};
pub use parser::{parse_pattern, Pattern};
