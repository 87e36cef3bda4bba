//! Locale selection for subsites.

/// Likely full locale for common bare language codes.
const LIKELY_SUBTAGS: &[(&str, &str)] = &[
    ("ar", "ar_EG"),
    ("da", "da_DK"),
    ("de", "de_DE"),
    ("en", "en_US"),
    ("es", "es_ES"),
    ("fi", "fi_FI"),
    ("fr", "fr_FR"),
    ("it", "it_IT"),
    ("ja", "ja_JP"),
    ("mi", "mi_NZ"),
    ("nb", "nb_NO"),
    ("nl", "nl_NL"),
    ("pl", "pl_PL"),
    ("pt", "pt_BR"),
    ("ru", "ru_RU"),
    ("sv", "sv_SE"),
    ("zh", "zh_CN"),
];

/// Expand a subsite language into the locale to activate.
///
/// Bare language codes go through the likely-subtags table; full locales
/// (`en_NZ`, `en-NZ`) are kept with an underscore separator. Unknown bare
/// codes yield `None` and leave the active locale untouched.
///
/// # Examples
///
/// ```
/// use subsites_tenancy::locale::likely_locale;
///
/// assert_eq!(likely_locale("fr").as_deref(), Some("fr_FR"));
/// assert_eq!(likely_locale("en-NZ").as_deref(), Some("en_NZ"));
/// assert_eq!(likely_locale("xx"), None);
/// ```
pub fn likely_locale(language: &str) -> Option<String> {
    let language = language.trim();
    if language.is_empty() {
        return None;
    }

    if let Some((lang, region)) = language.split_once(['_', '-']) {
        if lang.is_empty() || region.is_empty() {
            return None;
        }
        return Some(format!("{}_{}", lang, region));
    }

    LIKELY_SUBTAGS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, locale)| (*locale).to_string())
}
