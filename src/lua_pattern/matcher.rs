//! Backtracking matcher for `parser::Pattern`. The teacher's own matcher
//! (`lua_pattern::matcher`) special-cased quantifiers independently and
//! left `-` (lazy) as a stub that always matched zero repetitions; this
//! version threads a single `(pattern index, text index)` cursor through
//! recursion so a quantifier's failure can backtrack into the rest of the
//! pattern, the way `str_find_aux` in Lua's own `lstrlib.c` does.

use super::parser::{Atom, Item, Pattern, Quant};

pub struct Capture {
    start: usize,
    end: Option<usize>,
    position: bool,
}

struct Matcher<'a> {
    items: &'a [Item],
    text: &'a [char],
    captures: Vec<Capture>,
}

impl<'a> Matcher<'a> {
    fn do_match(&mut self, pi: usize, ti: usize) -> Option<usize> {
        if pi >= self.items.len() {
            return Some(ti);
        }
        match &self.items[pi] {
            Item::AnchorStart => self.do_match(pi + 1, ti),
            Item::AnchorEnd => {
                if ti == self.text.len() {
                    self.do_match(pi + 1, ti)
                } else {
                    None
                }
            }
            Item::CaptureOpen { position } => {
                let end = if *position { Some(ti) } else { None };
                self.captures.push(Capture { start: ti, end, position: *position });
                match self.do_match(pi + 1, ti) {
                    Some(r) => Some(r),
                    None => {
                        self.captures.pop();
                        None
                    }
                }
            }
            Item::CaptureClose => {
                let idx = self
                    .captures
                    .iter()
                    .rposition(|c| c.end.is_none())
                    .expect("unmatched capture close");
                self.captures[idx].end = Some(ti);
                match self.do_match(pi + 1, ti) {
                    Some(r) => Some(r),
                    None => {
                        self.captures[idx].end = None;
                        None
                    }
                }
            }
            Item::Backref(n) => {
                let cap = self.captures.get(n.wrapping_sub(1))?;
                let end = cap.end?;
                let text = &self.text[cap.start..end];
                let len = text.len();
                if ti + len <= self.text.len() && &self.text[ti..ti + len] == text {
                    self.do_match(pi + 1, ti + len)
                } else {
                    None
                }
            }
            Item::Balanced(open, close) => {
                if self.text.get(ti) != Some(open) {
                    return None;
                }
                let mut depth = 1;
                let mut cur = ti + 1;
                while cur < self.text.len() && depth > 0 {
                    if self.text[cur] == *open {
                        depth += 1;
                    } else if self.text[cur] == *close {
                        depth -= 1;
                    }
                    cur += 1;
                }
                if depth == 0 {
                    self.do_match(pi + 1, cur)
                } else {
                    None
                }
            }
            Item::Atom(atom, quant) => self.match_atom(pi, atom, *quant, ti),
        }
    }

    fn single(&self, atom: &Atom, ti: usize) -> bool {
        self.text.get(ti).map(|c| atom.matches(*c)).unwrap_or(false)
    }

    fn match_atom(&mut self, pi: usize, atom: &Atom, quant: Quant, ti: usize) -> Option<usize> {
        match quant {
            Quant::One => {
                if self.single(atom, ti) {
                    self.do_match(pi + 1, ti + 1)
                } else {
                    None
                }
            }
            Quant::Opt => {
                if self.single(atom, ti) {
                    if let Some(r) = self.do_match(pi + 1, ti + 1) {
                        return Some(r);
                    }
                }
                self.do_match(pi + 1, ti)
            }
            Quant::Star => self.max_expand(pi, atom, ti, 0),
            Quant::Plus => {
                if self.single(atom, ti) {
                    self.max_expand(pi, atom, ti + 1, 1)
                } else {
                    None
                }
            }
            Quant::Minus => self.min_expand(pi, atom, ti),
        }
    }

    /// Greedy repetition: consume as much as the atom allows, then
    /// backtrack one character at a time until the rest of the pattern
    /// matches.
    fn max_expand(&mut self, pi: usize, atom: &Atom, base: usize, _already: usize) -> Option<usize> {
        let mut count = 0;
        while self.single(atom, base + count) {
            count += 1;
        }
        loop {
            if let Some(r) = self.do_match(pi + 1, base + count) {
                return Some(r);
            }
            if count == 0 {
                return None;
            }
            count -= 1;
        }
    }

    /// Lazy repetition: try the continuation first, only consuming
    /// another character once the continuation fails.
    fn min_expand(&mut self, pi: usize, atom: &Atom, mut ti: usize) -> Option<usize> {
        loop {
            if let Some(r) = self.do_match(pi + 1, ti) {
                return Some(r);
            }
            if self.single(atom, ti) {
                ti += 1;
            } else {
                return None;
            }
        }
    }
}

/// One successful match: overall span plus any `()` capture spans.
pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

impl MatchResult {
    /// Capture text as Lua would return it: explicit captures in order,
    /// or the whole match when the pattern declared none.
    pub fn capture_strings(&self, text: &[char]) -> Vec<String> {
        if self.captures.is_empty() {
            return vec![text[self.start..self.end].iter().collect()];
        }
        self.captures
            .iter()
            .map(|c| {
                if c.position {
                    (c.start + 1).to_string()
                } else {
                    text[c.start..c.end.unwrap_or(c.start)].iter().collect()
                }
            })
            .collect()
    }
}

/// Tries to match `pattern` starting exactly at `start`.
pub fn match_at(text: &[char], pattern: &Pattern, start: usize) -> Option<MatchResult> {
    let mut m = Matcher { items: &pattern.items, text, captures: Vec::new() };
    let end = m.do_match(0, start)?;
    Some(MatchResult { start, end, captures: m.captures })
}

/// Scans forward from `init`, returning the first match (spec.md §4.6
/// `string.find`/`string.match`). An anchored pattern (`^...`) only tries
/// position `init` itself, matching Lua's own short-circuit.
pub fn find(text: &[char], pattern: &Pattern, init: usize) -> Option<MatchResult> {
    let anchored = matches!(pattern.items.first(), Some(Item::AnchorStart));
    let mut pos = init;
    loop {
        if let Some(m) = match_at(text, pattern, pos) {
            return Some(m);
        }
        if anchored || pos >= text.len() {
            return None;
        }
        pos += 1;
    }
}

/// `string.gmatch` iterator state: repeated `find` calls advancing past
/// each match (and by one character on an empty match, to avoid looping
/// forever).
pub fn next_match(text: &[char], pattern: &Pattern, from: usize) -> Option<MatchResult> {
    find(text, pattern, from)
}
