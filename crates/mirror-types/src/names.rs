//! Field and locale name normalization.
//!
//! The remote API uses camelCase field names and BCP 47 locale codes
//! ("mi-NZ"); the mirror stores snake_case keys ("mi_nz").

/// Convert a camelCase or PascalCase identifier to snake_case.
///
/// Existing underscores are preserved and runs of capitals are treated as a
/// single word (`"imageURL"` → `"image_url"`).
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let starts_word = match prev {
                None | Some('_') | Some('-') | Some(' ') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if starts_word {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Normalize a locale code into a key suffix: lowercase, `-` becomes `_`.
pub fn normalize_locale(locale: &str) -> String {
    to_snake_case(locale).to_lowercase().replace('-', "_")
}

/// Singularize the last word of a snake_case field name.
///
/// Covers the regular English plural forms used in content models; names
/// that are already singular are returned unchanged.
pub fn singularize(name: &str) -> String {
    let (head, word) = match name.rfind('_') {
        Some(pos) => name.split_at(pos + 1),
        None => ("", name),
    };

    let singular = singularize_word(word);
    format!("{head}{singular}")
}

fn singularize_word(word: &str) -> String {
    const IRREGULAR: &[(&str, &str)] = &[
        ("people", "person"),
        ("children", "child"),
        ("men", "man"),
        ("women", "woman"),
        ("media", "medium"),
        ("data", "datum"),
    ];
    const UNCHANGED: &[&str] = &["news", "series", "species", "status", "address", "class"];

    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == word) {
        return (*singular).to_string();
    }
    if UNCHANGED.contains(&word) || word.len() < 3 {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("fieldWithLocales"), "field_with_locales");
        assert_eq!(to_snake_case("manyRefs"), "many_refs");
        assert_eq!(to_snake_case("title"), "title");
        assert_eq!(to_snake_case("imageURL"), "image_url");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("HeroImage"), "hero_image");
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("mi-NZ"), "mi_nz");
        assert_eq!(normalize_locale("fr"), "fr");
        assert_eq!(normalize_locale("zh-Hant-TW"), "zh_hant_tw");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("tags"), "tag");
        assert_eq!(singularize("many_refs"), "many_ref");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("related_boxes"), "related_box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("author"), "author");
        assert_eq!(singularize("news"), "news");
    }
}
