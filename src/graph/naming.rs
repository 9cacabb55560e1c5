//! Local name derivation.
//!
//! A node's local name is its provider ID made safe for an HCL block label:
//! every character outside `[A-Za-z0-9]` becomes `_`, a leading digit is
//! prefixed with `_`, and an empty result becomes `resource`. Names collide
//! only within a resource type; the second holder of a name gets `_2`, the
//! third `_3`, and so on.

/// Sanitize a provider ID into a label.
#[must_use]
pub fn sanitize(provider_id: &str) -> String {
    let mut name: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() {
        return "resource".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// First of `base`, `base_2`, `base_3`, … for which `taken` is false.
#[must_use]
pub fn unique(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (2_usize..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
