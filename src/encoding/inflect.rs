//! Minimal English inflection for resource and element names.

const IRREGULAR: [(&str, &str); 3] = [
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
];

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// `WidgetPart` / `widget-part` → `widget_part`.
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c == '-' || c == ' ' {
            out.push('_');
        } else if c.is_uppercase() {
            if prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Pluralize one lowercase word. Words already ending in a single `s` are
/// taken to be plural.
pub fn pluralize(word: &str) -> String {
    if let Some((_, plural)) = IRREGULAR.iter().find(|(s, p)| *s == word || *p == word) {
        return (*plural).to_string();
    }
    if word.ends_with("ss")
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    if word.ends_with('s') {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y')
        && stem.chars().last().is_some_and(|c| !is_vowel(c))
    {
        return format!("{stem}ies");
    }
    format!("{word}s")
}

/// Singularize one lowercase word. Returns the input when no rule applies.
pub fn singularize(word: &str) -> String {
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, p)| *p == word) {
        return (*singular).to_string();
    }
    if let Some(stem) = word.strip_suffix("ies")
        && !stem.is_empty()
    {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "zes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s')
        && !stem.is_empty()
        && !stem.ends_with('s')
        && !stem.ends_with('u')
    {
        return stem.to_string();
    }
    word.to_string()
}

/// Table-style name: underscored with the last word pluralized.
pub fn tableize(name: &str) -> String {
    let underscored = underscore(name);
    match underscored.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralize(last)),
        None => pluralize(&underscored),
    }
}

/// Model-style name: `widget_parts` → `WidgetPart`.
pub fn classify(name: &str) -> String {
    let underscored = underscore(name);
    let (head, last) = match underscored.rsplit_once('_') {
        Some((head, last)) => (Some(head), last),
        None => (None, underscored.as_str()),
    };
    let singular = singularize(last);

    head.into_iter()
        .flat_map(|h| h.split('_'))
        .chain(std::iter::once(singular.as_str()))
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
