use std::collections::HashMap;

use fluent_templates::{
    fluent_bundle::{FluentArgs, FluentValue},
    static_loader, Loader,
};
use once_cell::sync::Lazy;
use unic_langid::LanguageIdentifier;

static_loader! {
    static LOCALES = {
        locales: "./locales",
        fallback_language: "es",
        // Job numbers like "#12" are matched literally; no bidi isolation marks
        customise: |bundle| bundle.set_use_isolating(false),
    };
}

/// Supported languages (code, human-readable name).
pub static SUPPORTED_LANGS: &[(&str, &str)] = &[("es", "Español"), ("en", "English")];

/// Default language identifier used as a fallback.
static DEFAULT_LANG: Lazy<LanguageIdentifier> = Lazy::new(|| "es".parse().expect("default language tag"));

/// Language used when the Telegram profile gives no usable hint.
pub fn default_lang() -> LanguageIdentifier {
    DEFAULT_LANG.clone()
}

/// Normalizes a language code into a LanguageIdentifier (falls back to default).
pub fn lang_from_code(code: &str) -> LanguageIdentifier {
    match is_language_supported(code) {
        Some(supported) => supported.parse().unwrap_or_else(|_| DEFAULT_LANG.clone()),
        None => DEFAULT_LANG.clone(),
    }
}

/// Language for a Telegram user's `language_code`, if any.
pub fn lang_from_telegram(code: Option<&str>) -> LanguageIdentifier {
    code.map(lang_from_code).unwrap_or_else(default_lang)
}

/// Returns a localized string for the given key.
/// Converts literal `\n` sequences to actual newlines for proper Telegram formatting.
pub fn t(lang: &LanguageIdentifier, key: &str) -> String {
    let text = LOCALES
        .lookup(lang, key)
        .unwrap_or_else(|| LOCALES.lookup(&DEFAULT_LANG, key).unwrap_or_else(|| key.to_string()));
    text.replace("\\n", "\n")
}

/// Returns a localized string with arguments for interpolation.
/// Converts literal `\n` sequences to actual newlines for proper Telegram formatting.
pub fn t_args(lang: &LanguageIdentifier, key: &str, args: &FluentArgs) -> String {
    let args_map: HashMap<String, FluentValue> = args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();

    let text = LOCALES.lookup_with_args(lang, key, &args_map).unwrap_or_else(|| {
        LOCALES
            .lookup_with_args(&DEFAULT_LANG, key, &args_map)
            .unwrap_or_else(|| key.to_string())
    });
    text.replace("\\n", "\n")
}

/// Checks if a language code is supported by the bot.
/// Returns the normalized language code if supported, None otherwise.
pub fn is_language_supported(code: &str) -> Option<&'static str> {
    // Normalize the code (e.g., "es-MX" -> "es", "en-US" -> "en")
    let normalized = code.split(['-', '_']).next().unwrap_or(code).to_lowercase();

    SUPPORTED_LANGS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(&normalized))
        .map(|(c, _)| *c)
}
