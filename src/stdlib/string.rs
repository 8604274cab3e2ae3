//! `string.*` (spec.md §4.6): `len sub upper lower rep reverse byte char
//! format` plus the pattern-backed `find match gmatch gsub`, grounded on
//! the teacher's `stdlib::string` for the plain functions and on
//! `lua_pattern` (this crate's own rewrite, see its module doc) for the
//! pattern-backed ones.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, check_int, check_number, check_string, opt_int, tostring_value};
use crate::lua_pattern::{find, next_match, parse_pattern};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{Foreign, LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "len", string_len);
    LuaVM::register_foreign(table, "sub", string_sub);
    LuaVM::register_foreign(table, "upper", string_upper);
    LuaVM::register_foreign(table, "lower", string_lower);
    LuaVM::register_foreign(table, "rep", string_rep);
    LuaVM::register_foreign(table, "reverse", string_reverse);
    LuaVM::register_foreign(table, "byte", string_byte);
    LuaVM::register_foreign(table, "char", string_char);
    LuaVM::register_foreign(table, "format", string_format);
    LuaVM::register_foreign(table, "find", string_find);
    LuaVM::register_foreign(table, "match", string_match);
    LuaVM::register_foreign(table, "gmatch", string_gmatch);
    LuaVM::register_foreign(table, "gsub", string_gsub);
}

/// Lua string indices are 1-based and negative indices count from the
/// end; this normalizes `(i, j)` into a 0-based `[start, end)` byte-free
/// char range clamped to the string's bounds.
fn normalize_range(len: i64, i: i64, j: i64) -> (usize, usize) {
    let resolve = |n: i64| -> i64 {
        if n >= 0 {
            n
        } else {
            (len + n + 1).max(0)
        }
    };
    let mut start = resolve(i);
    let mut end = resolve(j);
    if start < 1 {
        start = 1;
    }
    if end > len {
        end = len;
    }
    if start > end {
        return (0, 0);
    }
    ((start - 1) as usize, end as usize)
}

fn string_len(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "len")?;
    Ok(vec![LuaValue::Int(s.chars().count() as i64)])
}

fn string_sub(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "sub")?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let i = opt_int(args, 1, 1);
    let j = opt_int(args, 2, -1);
    let (start, end) = normalize_range(len, i, j);
    Ok(vec![LuaValue::string(chars[start..end].iter().collect::<String>())])
}

fn string_upper(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::string(check_string(vm, args, 0, "upper")?.to_uppercase())])
}

fn string_lower(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::string(check_string(vm, args, 0, "lower")?.to_lowercase())])
}

fn string_rep(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "rep")?;
    let n = check_int(vm, args, 1, "rep")?;
    let sep = match arg(args, 2) {
        LuaValue::Nil => String::new(),
        _ => check_string(vm, args, 2, "rep")?,
    };
    if n <= 0 {
        return Ok(vec![LuaValue::string("")]);
    }
    let parts = vec![s; n as usize];
    Ok(vec![LuaValue::string(parts.join(&sep))])
}

fn string_reverse(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "reverse")?;
    Ok(vec![LuaValue::string(s.chars().rev().collect::<String>())])
}

fn string_byte(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "byte")?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let i = opt_int(args, 1, 1);
    let j = opt_int(args, 2, i);
    let (start, end) = normalize_range(len, i, j);
    Ok(chars[start..end].iter().map(|c| LuaValue::Int(*c as i64)).collect())
}

fn string_char(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut s = String::with_capacity(args.len());
    for n in 0..args.len() {
        let code = check_int(vm, args, n, "char")?;
        let c = char::from_u32(code as u32)
            .ok_or_else(|| vm.raise_message(format!("bad argument #{} to 'char' (value out of range)", n + 1)))?;
        s.push(c);
    }
    Ok(vec![LuaValue::string(s)])
}

/// `string.format`: supports `%d %i %u %s %q %x %X %o %c %f %g %e %%`
/// (spec.md §4.6). Width/precision/flags are passed through to Rust's
/// own formatting machinery where that covers the directive.
fn string_format(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let fmt = check_string(vm, args, 0, "format")?;
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut arg_index = 1;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = String::new();
        loop {
            match chars.peek() {
                Some(d) if "-+ #0".contains(*d) => {
                    flags.push(*d);
                    chars.next();
                }
                _ => break,
            }
        }
        let mut width_digits = String::new();
        while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
            width_digits.push(chars.next().unwrap());
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut prec_digits = String::new();
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                prec_digits.push(chars.next().unwrap());
            }
            precision = Some(prec_digits.parse().unwrap_or(0));
        }
        let directive = chars
            .next()
            .ok_or_else(|| vm.raise_message("invalid conversion to 'format'"))?;
        if directive == '%' {
            out.push('%');
            continue;
        }
        let spec = FormatSpec { flags: &flags, width: width_digits.parse().unwrap_or(0) };
        let value = arg(args, arg_index);
        arg_index += 1;
        match directive {
            'd' | 'i' | 'u' => {
                let n = check_int(vm, args, arg_index - 1, "format")?;
                out.push_str(&spec.apply(&n.to_string()));
            }
            's' => {
                let s = tostring_value(vm, &value)?;
                out.push_str(&spec.apply(&s));
            }
            'q' => {
                out.push('"');
                for c in tostring_value(vm, &value)?.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\0' => out.push_str("\\0"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            'x' => out.push_str(&spec.apply(&format!("{:x}", check_int(vm, args, arg_index - 1, "format")?))),
            'X' => out.push_str(&spec.apply(&format!("{:X}", check_int(vm, args, arg_index - 1, "format")?))),
            'o' => out.push_str(&spec.apply(&format!("{:o}", check_int(vm, args, arg_index - 1, "format")?))),
            'c' => {
                let code = check_int(vm, args, arg_index - 1, "format")?;
                out.push(char::from_u32(code as u32).unwrap_or('\u{fffd}'));
            }
            'f' | 'F' => {
                let n = check_number(vm, args, arg_index - 1, "format")?;
                out.push_str(&spec.apply(&format!("{:.*}", precision.unwrap_or(6), n)));
            }
            'e' | 'E' => {
                let n = check_number(vm, args, arg_index - 1, "format")?;
                out.push_str(&spec.apply(&format!("{:.*e}", precision.unwrap_or(6), n)));
            }
            'g' | 'G' => {
                let n = check_number(vm, args, arg_index - 1, "format")?;
                out.push_str(&spec.apply(&format!("{}", n)));
            }
            other => return Err(vm.raise_message(format!("invalid conversion '%{}' to 'format'", other))),
        }
    }
    Ok(vec![LuaValue::string(out)])
}

/// A parsed `%[flags][width]` prefix, applied after the directive has
/// rendered its value to text. Precision is consumed by the caller
/// directly (it only matters for `%f`/`%e`), so this only tracks the
/// flags that affect padding.
struct FormatSpec<'a> {
    flags: &'a str,
    width: usize,
}

impl FormatSpec<'_> {
    fn apply(&self, rendered: &str) -> String {
        let left = self.flags.contains('-');
        let zero = self.flags.contains('0') && !left;
        let len = rendered.chars().count();
        if len >= self.width {
            return rendered.to_string();
        }
        let pad = self.width - len;
        if left {
            format!("{}{}", rendered, " ".repeat(pad))
        } else if zero {
            format!("{}{}", "0".repeat(pad), rendered)
        } else {
            format!("{}{}", " ".repeat(pad), rendered)
        }
    }
}

fn string_find(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "find")?;
    let pattern_str = check_string(vm, args, 1, "find")?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let init = opt_int(args, 2, 1);
    let start = if init > 0 {
        (init - 1).min(len) as usize
    } else {
        (len + init).max(0) as usize
    };
    let plain = arg(args, 3).truthy();
    if plain || !pattern_str.chars().any(|c| "^$*+?.([%-".contains(c)) {
        let pattern_chars: Vec<char> = pattern_str.chars().collect();
        if pattern_chars.is_empty() {
            return Ok(vec![LuaValue::Int(start as i64 + 1), LuaValue::Int(start as i64)]);
        }
        let mut pos = start;
        while pos + pattern_chars.len() <= chars.len() {
            if chars[pos..pos + pattern_chars.len()] == pattern_chars[..] {
                return Ok(vec![
                    LuaValue::Int(pos as i64 + 1),
                    LuaValue::Int((pos + pattern_chars.len()) as i64),
                ]);
            }
            pos += 1;
        }
        return Ok(vec![LuaValue::Nil]);
    }
    let pattern = parse_pattern(&pattern_str).map_err(|e| vm.raise_message(e))?;
    match find(&chars, &pattern, start) {
        Some(m) => {
            let mut out = vec![LuaValue::Int(m.start as i64 + 1), LuaValue::Int(m.end as i64)];
            if !m.captures.is_empty() {
                out.extend(m.capture_strings(&chars).into_iter().map(LuaValue::string));
            }
            Ok(out)
        }
        None => Ok(vec![LuaValue::Nil]),
    }
}

fn string_match(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "match")?;
    let pattern_str = check_string(vm, args, 1, "match")?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let init = opt_int(args, 2, 1);
    let start = if init > 0 {
        (init - 1).min(len) as usize
    } else {
        (len + init).max(0) as usize
    };
    let pattern = parse_pattern(&pattern_str).map_err(|e| vm.raise_message(e))?;
    match find(&chars, &pattern, start) {
        Some(m) => Ok(m.capture_strings(&chars).into_iter().map(LuaValue::string).collect()),
        None => Ok(vec![LuaValue::Nil]),
    }
}

fn string_gmatch(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "gmatch")?;
    let pattern_str = check_string(vm, args, 1, "gmatch")?;
    let chars: Vec<char> = s.chars().collect();
    let pattern = parse_pattern(&pattern_str).map_err(|e| vm.raise_message(e))?;
    let pos = Rc::new(RefCell::new(0usize));
    let iter = Foreign::new("gmatch_iterator", move |_args: &[LuaValue], _vm: &mut LuaVM| {
        let mut cursor = pos.borrow_mut();
        if *cursor > chars.len() {
            return Ok(vec![LuaValue::Nil]);
        }
        match next_match(&chars, &pattern, *cursor) {
            Some(m) => {
                *cursor = if m.end > m.start { m.end } else { m.end + 1 };
                Ok(m.capture_strings(&chars).into_iter().map(LuaValue::string).collect())
            }
            None => {
                *cursor = chars.len() + 1;
                Ok(vec![LuaValue::Nil])
            }
        }
    });
    Ok(vec![LuaValue::Foreign(Rc::new(iter))])
}

fn string_gsub(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = check_string(vm, args, 0, "gsub")?;
    let pattern_str = check_string(vm, args, 1, "gsub")?;
    let repl = arg(args, 2);
    let max_count = match arg(args, 3) {
        LuaValue::Nil => i64::MAX,
        _ => check_int(vm, args, 3, "gsub")?,
    };
    let chars: Vec<char> = s.chars().collect();
    let pattern = parse_pattern(&pattern_str).map_err(|e| vm.raise_message(e))?;
    let mut out = String::new();
    let mut pos = 0usize;
    let mut count = 0i64;
    while pos <= chars.len() && count < max_count {
        let m = match next_match(&chars, &pattern, pos) {
            Some(m) => m,
            None => break,
        };
        out.extend(&chars[pos..m.start]);
        let captures = m.capture_strings(&chars);
        let whole: String = chars[m.start..m.end].iter().collect();
        let replacement = match &repl {
            LuaValue::Str(template) => expand_template(template.as_str(), &whole, &captures),
            LuaValue::Table(t) => {
                let key = captures.first().cloned().unwrap_or_else(|| whole.clone());
                let v = t.borrow().get(&LuaValue::string(key));
                if v.is_nil() || matches!(v, LuaValue::Bool(false)) {
                    whole.clone()
                } else {
                    tostring_value(vm, &v)?
                }
            }
            _ => {
                let call_args: Vec<LuaValue> = captures.iter().cloned().map(LuaValue::string).collect();
                let result = vm.call_value_nested(repl.clone(), call_args)?;
                match result.into_iter().next() {
                    Some(v) if !v.is_nil() && !matches!(v, LuaValue::Bool(false)) => tostring_value(vm, &v)?,
                    _ => whole.clone(),
                }
            }
        };
        out.push_str(&replacement);
        count += 1;
        pos = if m.end > m.start { m.end } else { m.end + 1 };
        if m.end == m.start && m.start < chars.len() {
            out.push(chars[m.start]);
        }
    }
    out.extend(&chars[pos.min(chars.len())..]);
    Ok(vec![LuaValue::string(out), LuaValue::Int(count)])
}

/// Expands `%0`..`%9` in a gsub replacement template; `%0` and `%%` are
/// Lua's own conventions for "whole match" and a literal percent.
fn expand_template(template: &str, whole: &str, captures: &[String]) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('0') => out.push_str(whole),
            Some(d) if d.is_ascii_digit() => {
                let idx = d.to_digit(10).unwrap() as usize;
                if let Some(cap) = captures.get(idx - 1) {
                    out.push_str(cap);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
