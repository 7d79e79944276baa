//! Symmetry operators as text, e.g. `-X+1/2,Y,-Z`.
//!
//! Rows of the augmented matrix map to comma-separated terms; translations
//! are written as twelfths reduced to lowest terms.

use crate::model::SymopMatrix;

const AXES: [char; 3] = ['X', 'Y', 'Z'];

pub fn format(op: &SymopMatrix) -> String {
    op[..3].iter().map(format_row).collect::<Vec<_>>().join(",")
}

fn format_row(row: &[f32; 4]) -> String {
    let mut out = String::new();
    for (axis, &c) in AXES.iter().zip(&row[..3]) {
        if c == 0.0 {
            continue;
        }
        let sign = if c < 0.0 { '-' } else { '+' };
        let magnitude = c.abs();
        if magnitude == 1.0 {
            out.push(sign);
        } else {
            out.push_str(&format!("{sign}{magnitude}*"));
        }
        out.push(*axis);
    }
    let twelfths = (row[3] * 12.0).round() as i32;
    if twelfths != 0 {
        let g = gcd(twelfths.unsigned_abs(), 12) as i32;
        let (num, den) = (twelfths / g, 12 / g);
        if den == 1 {
            out.push_str(&format!("{num:+}"));
        } else {
            out.push_str(&format!("{num:+}/{den}"));
        }
    }
    if out.is_empty() {
        out.push('0');
    }
    out.strip_prefix('+').map(str::to_owned).unwrap_or(out)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Parse a three-row operator.  `None` if the text is not one.
pub fn parse(text: &str) -> Option<SymopMatrix> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let rows: Vec<&str> = compact.split(',').collect();
    if rows.len() != 3 {
        return None;
    }
    let mut op = [[0.0f32; 4]; 4];
    for (i, row) in rows.iter().enumerate() {
        op[i] = parse_row(row)?;
    }
    op[3][3] = 1.0;
    Some(op)
}

fn parse_row(row: &str) -> Option<[f32; 4]> {
    if row.is_empty() {
        return None;
    }
    let mut out = [0.0f32; 4];
    let mut rest = row;
    while !rest.is_empty() {
        let sign = match rest.as_bytes()[0] {
            b'-' => { rest = &rest[1..]; -1.0 }
            b'+' => { rest = &rest[1..]; 1.0 }
            _    => 1.0,
        };
        // Coefficient or translation: digits, '.', and an optional '/'.
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '/'))
            .unwrap_or(rest.len());
        let number = match &rest[..digits] {
            "" => None,
            n  => Some(parse_number(n)?),
        };
        rest = rest[digits..].strip_prefix('*').unwrap_or(&rest[digits..]);

        let axis = rest
            .chars()
            .next()
            .and_then(|c| AXES.iter().position(|&a| a == c.to_ascii_uppercase()));
        match (axis, number) {
            (Some(a), n) => {
                out[a] += sign * n.unwrap_or(1.0);
                rest = &rest[1..];
            }
            (None, Some(n)) => out[3] += sign * n,
            (None, None) => return None,
        }
    }
    Some(out)
}

fn parse_number(text: &str) -> Option<f32> {
    match text.split_once('/') {
        Some((num, den)) => {
            let den: f32 = den.parse().ok()?;
            (den != 0.0).then_some(num.parse::<f32>().ok()? / den)
        }
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(rows: [[f32; 4]; 3]) -> SymopMatrix {
        [rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]]
    }

    #[test]
    fn identity() {
        let id = op([[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
        assert_eq!(format(&id), "X,Y,Z");
        assert_eq!(parse("X,Y,Z"), Some(id));
        assert_eq!(parse(" x , y , z "), Some(id));
    }

    #[test]
    fn translations_in_lowest_terms() {
        let m = op([
            [-1.0, 0.0, 0.0, 0.5],
            [0.0, 1.0, 0.0, 1.0 / 3.0],
            [0.0, 0.0, -1.0, 0.75],
        ]);
        assert_eq!(format(&m), "-X+1/2,Y+1/3,-Z+3/4");
        let back = parse(&format(&m)).unwrap();
        for (a, b) in back.iter().flatten().zip(m.iter().flatten()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn leading_translation_and_mixed_terms() {
        let m = parse("1/2+X,-Y+X,Z-1/4").unwrap();
        assert_eq!(m[0], [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(m[1], [1.0, -1.0, 0.0, 0.0]);
        assert_eq!(m[2], [0.0, 0.0, 1.0, -0.25]);
        assert_eq!(format(&m), "X+1/2,X-Y,Z-1/4");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("X,Y"), None);
        assert_eq!(parse("X,,Z"), None);
        assert_eq!(parse("X,Q,Z"), None);
        assert_eq!(parse("X/0,Y,Z"), None);
    }
}
