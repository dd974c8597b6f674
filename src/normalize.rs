// 🔤 Name Normalization - The one key shape every comparison goes through
// Lowercase, then drop punctuation that varies between exports: - _ / ( ) . , "
// plus all whitespace. Never compare raw display names anywhere else.

/// Characters removed from every account name before comparison
pub const STRIPPED_CHARS: [char; 8] = ['-', '_', '/', '(', ')', '.', ',', '"'];

/// Normalize an account display name into its comparison key.
///
/// Empty or whitespace-only input yields an empty string. The result is
/// stable under repeated application.
///
/// ```
/// use trial_balance_classifier::normalize_name;
///
/// assert_eq!(normalize_name("Cash - Operating (USD)"), "cashoperatingusd");
/// assert_eq!(normalize_name("   "), "");
/// ```
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_CHARS.contains(c))
        .collect()
}

/// Normalize an optional name, mapping blanks to `None`
pub fn normalize_optional(name: Option<&str>) -> Option<String> {
    name.map(normalize_name).filter(|n| !n.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
