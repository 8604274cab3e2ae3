//! Lua pattern string parser: turns a pattern string into a flat item
//! list the matcher walks with an explicit (pattern index, text index)
//! cursor pair, the same shape as Lua's own `lstrlib.c` matcher.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Letter,
    Control,
    Digit,
    Graph,
    Lower,
    Punct,
    Space,
    Upper,
    AlphaNum,
    Hex,
}

impl CharClass {
    fn matches(self, c: char) -> bool {
        match self {
            CharClass::Letter => c.is_alphabetic(),
            CharClass::Control => c.is_control(),
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Graph => !c.is_whitespace() && !c.is_control(),
            CharClass::Lower => c.is_lowercase(),
            CharClass::Punct => c.is_ascii_punctuation(),
            CharClass::Space => c.is_whitespace(),
            CharClass::Upper => c.is_uppercase(),
            CharClass::AlphaNum => c.is_alphanumeric(),
            CharClass::Hex => c.is_ascii_hexdigit(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SetItem {
    Char(char),
    Range(char, char),
    Class(CharClass),
}

#[derive(Debug, Clone)]
pub enum Atom {
    Char(char),
    Dot,
    Class(CharClass),
    Set { items: Vec<SetItem>, negated: bool },
}

impl Atom {
    pub fn matches(&self, c: char) -> bool {
        match self {
            Atom::Char(x) => *x == c,
            Atom::Dot => true,
            Atom::Class(class) => class.matches(c),
            Atom::Set { items, negated } => {
                let hit = items.iter().any(|item| match item {
                    SetItem::Char(x) => *x == c,
                    SetItem::Range(lo, hi) => *lo <= c && c <= *hi,
                    SetItem::Class(class) => class.matches(c),
                });
                hit != *negated
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quant {
    One,
    Star,
    Plus,
    Minus,
    Opt,
}

#[derive(Debug, Clone)]
pub enum Item {
    Atom(Atom, Quant),
    CaptureOpen { position: bool },
    CaptureClose,
    Backref(usize),
    Balanced(char, char),
    AnchorStart,
    AnchorEnd,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub items: Vec<Item>,
}

/// Parses a Lua pattern string (spec.md §4.6 `string.*`, "patterns").
pub fn parse_pattern(pattern: &str) -> Result<Pattern, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut items = Vec::new();
    let mut pos = 0;
    if chars.first() == Some(&'^') {
        items.push(Item::AnchorStart);
        pos += 1;
    }
    parse_seq(&chars, &mut pos, &mut items, false)?;
    Ok(Pattern { items })
}

fn parse_seq(chars: &[char], pos: &mut usize, items: &mut Vec<Item>, in_capture: bool) -> Result<(), String> {
    while *pos < chars.len() {
        let c = chars[*pos];
        match c {
            ')' if in_capture => return Ok(()),
            '$' if *pos == chars.len() - 1 => {
                items.push(Item::AnchorEnd);
                *pos += 1;
            }
            '.' => {
                *pos += 1;
                push_atom(items, chars, pos, Atom::Dot);
            }
            '%' => {
                *pos += 1;
                let next = *chars.get(*pos).ok_or("malformed pattern (ends with '%')")?;
                if next.is_ascii_digit() && next != '0' {
                    items.push(Item::Backref(next.to_digit(10).unwrap() as usize));
                    *pos += 1;
                } else if next == 'b' {
                    *pos += 1;
                    let open = *chars.get(*pos).ok_or("missing arguments to '%b'")?;
                    let close = *chars.get(*pos + 1).ok_or("missing arguments to '%b'")?;
                    items.push(Item::Balanced(open, close));
                    *pos += 2;
                } else if let Some(class) = class_for(next) {
                    *pos += 1;
                    push_atom(items, chars, pos, class);
                } else {
                    *pos += 1;
                    push_atom(items, chars, pos, Atom::Char(next));
                }
            }
            '[' => {
                let set = parse_set(chars, pos)?;
                push_atom(items, chars, pos, set);
            }
            '(' => {
                *pos += 1;
                let position = chars.get(*pos) == Some(&')');
                items.push(Item::CaptureOpen { position });
                if !position {
                    parse_seq(chars, pos, items, true)?;
                }
                if chars.get(*pos) != Some(&')') {
                    return Err("unfinished capture".to_string());
                }
                *pos += 1;
                items.push(Item::CaptureClose);
            }
            _ => {
                *pos += 1;
                push_atom(items, chars, pos, Atom::Char(c));
            }
        }
    }
    Ok(())
}

/// Pushes `atom` onto `items`, folding in a trailing quantifier
/// (`* + - ?`) if one follows in the source at `*pos`.
fn push_atom(items: &mut Vec<Item>, chars: &[char], pos: &mut usize, atom: Atom) {
    let quant = match chars.get(*pos) {
        Some('*') => Some(Quant::Star),
        Some('+') => Some(Quant::Plus),
        Some('-') => Some(Quant::Minus),
        Some('?') => Some(Quant::Opt),
        _ => None,
    };
    if let Some(q) = quant {
        *pos += 1;
        items.push(Item::Atom(atom, q));
    } else {
        items.push(Item::Atom(atom, Quant::One));
    }
}

fn class_for(c: char) -> Option<Atom> {
    let (class, invert) = match c {
        'a' => (CharClass::Letter, false),
        'A' => (CharClass::Letter, true),
        'c' => (CharClass::Control, false),
        'C' => (CharClass::Control, true),
        'd' => (CharClass::Digit, false),
        'D' => (CharClass::Digit, true),
        'g' => (CharClass::Graph, false),
        'G' => (CharClass::Graph, true),
        'l' => (CharClass::Lower, false),
        'L' => (CharClass::Lower, true),
        'p' => (CharClass::Punct, false),
        'P' => (CharClass::Punct, true),
        's' => (CharClass::Space, false),
        'S' => (CharClass::Space, true),
        'u' => (CharClass::Upper, false),
        'U' => (CharClass::Upper, true),
        'w' => (CharClass::AlphaNum, false),
        'W' => (CharClass::AlphaNum, true),
        'x' => (CharClass::Hex, false),
        'X' => (CharClass::Hex, true),
        _ => return None,
    };
    if invert {
        Some(Atom::Set { items: vec![SetItem::Class(class)], negated: true })
    } else {
        Some(Atom::Class(class))
    }
}

fn parse_set(chars: &[char], pos: &mut usize) -> Result<Atom, String> {
    *pos += 1;
    let negated = chars.get(*pos) == Some(&'^');
    if negated {
        *pos += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    while *pos < chars.len() && (chars[*pos] != ']' || first) {
        first = false;
        let c = chars[*pos];
        if c == '%' && *pos + 1 < chars.len() {
            *pos += 1;
            let next = chars[*pos];
            match class_for(next) {
                Some(Atom::Class(class)) => items.push(SetItem::Class(class)),
                Some(Atom::Set { items: inner, .. }) => items.extend(inner),
                _ => items.push(SetItem::Char(next)),
            }
            *pos += 1;
        } else if *pos + 2 < chars.len() && chars[*pos + 1] == '-' && chars[*pos + 2] != ']' {
            items.push(SetItem::Range(c, chars[*pos + 2]));
            *pos += 3;
        } else {
            items.push(SetItem::Char(c));
            *pos += 1;
        }
    }
    if *pos >= chars.len() {
        return Err("malformed pattern (missing ']')".to_string());
    }
    *pos += 1;
    Ok(Atom::Set { items, negated })
}
