use std::collections::HashSet;

/// Paths served by non-tenant pages. Never handed to a created site.
pub const RESERVED_PATHS: &[&str] = &[
    "/",
    "/admin",
    "/api",
    "/chat",
    "/dashboard",
    "/login",
    "/onboarding",
    "/pricing",
    "/settings",
    "/signup",
];

const FALLBACK_SLUG: &str = "site";
const MAX_SLUG_CHARS: usize = 48;

pub fn is_reserved_path(path: &str) -> bool {
    RESERVED_PATHS.contains(&path)
}

/// Picks a path for a new site that is neither reserved nor in `taken`.
///
/// The slug comes from `name`; collisions get a numeric suffix.
pub fn allocate_url_path<'a, I>(name: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken = taken.into_iter().collect::<HashSet<_>>();
    let base = format!("/{}", slugify(name));

    let mut candidate = base.clone();
    let mut suffix = 2_u64;
    while is_reserved_path(&candidate) || taken.contains(candidate.as_str()) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    candidate
}

/// Lowercase ASCII slug; accented Latin letters fold to their base letter.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for character in name.chars().flat_map(fold_character) {
        if character.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(character.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_CHARS {
                break;
            }
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

fn fold_character(character: char) -> Option<char> {
    let folded = match character {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'ç' | 'Ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ñ' | 'Ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        '\'' | '’' => return None,
        other => other,
    };
    Some(folded)
}
