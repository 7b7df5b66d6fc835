//! Identifier casing conversion
//!
//! The class binder projects host exported identifiers (`PublicMethod`)
//! onto the embedded language's lower_case_with_underscores convention
//! (`public_method`). The reverse direction is provided for hosts that
//! generate embedded-side names.

/// Convert an exported host identifier to snake_case.
///
/// Runs of uppercase letters are kept together (`HTTPServer` →
/// `http_server`), digits attach to the preceding word.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && chars[i - 1].is_lowercase();
            let next_lower = i + 1 < chars.len() && chars[i + 1].is_lowercase();
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Convert an underscore-delimited name to CamelCase.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;

    for c in name.chars() {
        if c == '_' {
            at_word_start = true;
            continue;
        }
        if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("PublicMethod"), "public_method");
        assert_eq!(snake_case("PublicValue"), "public_value");
        assert_eq!(snake_case("IsEmpty"), "is_empty");
        assert_eq!(snake_case("SortBang"), "sort_bang");
        assert_eq!(snake_case("HTTPServer"), "http_server");
        assert_eq!(snake_case("ParseJSON"), "parse_json");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("X"), "x");
        assert_eq!(snake_case(""), "");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("public_method"), "PublicMethod");
        assert_eq!(camel_case("is_empty"), "IsEmpty");
        assert_eq!(camel_case("x"), "X");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn test_round_trip() {
        for name in ["PublicMethod", "IsEmpty", "Value"] {
            assert_eq!(camel_case(&snake_case(name)), name);
        }
    }
}
