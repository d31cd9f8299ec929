//! Lightweight i18n translation registry.
//!
//! Provides a centralized, static translation map keyed by `(locale, message_key)`.
//! Supported locales: `en`, `zh-CN`. No external i18n framework dependency.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Default locale when none is configured.
pub const DEFAULT_LOCALE: &str = "en";

/// Supported locales.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

/// Central translation registry.
pub struct Translations {
    map: HashMap<(&'static str, &'static str), &'static str>,
}

impl Translations {
    /// Get a translated string for the given locale and key.
    /// Falls back to `en` if the locale is not found, then to the provided default.
    pub fn get<'a>(&self, locale: &str, key: &str, default: &'a str) -> &'a str {
        if let Some(&val) = self.map.get(&(locale, key)) {
            return val;
        }
        if locale != "en" {
            if let Some(&val) = self.map.get(&("en", key)) {
                return val;
            }
        }
        default
    }

    /// Fill a translated template, replacing each `{name}` with its value.
    ///
    /// Substituted values are copied verbatim and never rescanned; unknown
    /// placeholders are left in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use metricwatch_common::i18n::TRANSLATIONS;
    ///
    /// let s = TRANSLATIONS.render(
    ///     "en",
    ///     "alert.threshold.invalid_query",
    ///     "",
    ///     &[("query", "host.name:")],
    /// );
    /// assert_eq!(s, "Alert is using a malformed KQL query: host.name:");
    /// ```
    pub fn render(
        &self,
        locale: &str,
        key: &str,
        default: &str,
        args: &[(&str, &str)],
    ) -> String {
        let mut rest = self.get(locale, key, default);
        let mut out = String::with_capacity(rest.len());
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            let Some(close) = tail.find('}') else {
                rest = &rest[open..];
                break;
            };
            let name = &tail[..close];
            match args.iter().find(|(arg, _)| *arg == name) {
                Some((_, value)) => out.push_str(value),
                None => out.push_str(&rest[open..open + close + 2]),
            }
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Global translation singleton.
pub static TRANSLATIONS: LazyLock<Translations> = LazyLock::new(|| {
    let mut map = HashMap::new();

    macro_rules! t {
        ($locale:expr, $key:expr, $val:expr) => {
            map.insert(($locale, $key), $val);
        };
    }

    // ---- Threshold reasons ----
    t!(
        "en",
        "alert.threshold.fired",
        "{metric} is {value} in the last {duration}{group}. Alert when {comparator} {threshold}."
    );
    t!(
        "zh-CN",
        "alert.threshold.fired",
        "{metric} 在最近 {duration}{group}内为 {value}。告警条件：{comparator} {threshold}。"
    );
    t!(
        "en",
        "alert.threshold.no_data",
        "{metric} reported no data in the last {duration}{group}"
    );
    t!(
        "zh-CN",
        "alert.threshold.no_data",
        "{metric} 在最近 {duration}{group}内无数据上报"
    );
    t!(
        "en",
        "alert.threshold.invalid_query",
        "Alert is using a malformed KQL query: {query}"
    );
    t!(
        "zh-CN",
        "alert.threshold.invalid_query",
        "告警使用了格式错误的 KQL 查询: {query}"
    );
    t!("en", "alert.threshold.for_group", " for {group}");
    t!("zh-CN", "alert.threshold.for_group", "（分组 {group}）");
    t!("en", "alert.threshold.no_data_value", "[NO DATA]");
    t!("zh-CN", "alert.threshold.no_data_value", "[无数据]");
    t!("en", "alert.threshold.range", "{low} and {high}");
    t!("zh-CN", "alert.threshold.range", "{low} 与 {high}");

    // ---- Alert state messages ----
    t!("en", "state.ok", "OK");
    t!("zh-CN", "state.ok", "正常");
    t!("en", "state.alert", "ALERT");
    t!("zh-CN", "state.alert", "告警");
    t!("en", "state.warning", "WARNING");
    t!("zh-CN", "state.warning", "警告");
    t!("en", "state.no_data", "NO DATA");
    t!("zh-CN", "state.no_data", "无数据");
    t!("en", "state.error", "ERROR");
    t!("zh-CN", "state.error", "错误");

    // ---- Comparator display ----
    t!("en", "op.above", "above");
    t!("zh-CN", "op.above", "高于");
    t!("en", "op.above_or_equal", "above or equal to");
    t!("zh-CN", "op.above_or_equal", "高于或等于");
    t!("en", "op.below", "below");
    t!("zh-CN", "op.below", "低于");
    t!("en", "op.below_or_equal", "below or equal to");
    t!("zh-CN", "op.below_or_equal", "低于或等于");
    t!("en", "op.between", "between");
    t!("zh-CN", "op.between", "介于");
    t!("en", "op.not_between", "not between");
    t!("zh-CN", "op.not_between", "不介于");

    Translations { map }
});

/// Check if a locale string is supported.
pub fn is_supported_locale(locale: &str) -> bool {
    SUPPORTED_LOCALES.contains(&locale)
}

/// Normalize locale: return the locale if supported, otherwise return the default.
pub fn normalize_locale(locale: &str) -> &str {
    if is_supported_locale(locale) {
        locale
    } else {
        DEFAULT_LOCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_translation_zh_cn() {
        let t = &*TRANSLATIONS;
        assert_eq!(t.get("zh-CN", "state.no_data", ""), "无数据");
        assert_eq!(t.get("zh-CN", "op.above", ""), "高于");
    }

    #[test]
    fn test_get_translation_en() {
        let t = &*TRANSLATIONS;
        assert_eq!(t.get("en", "state.no_data", ""), "NO DATA");
        assert_eq!(t.get("en", "op.between", ""), "between");
    }

    #[test]
    fn test_fallback_to_en() {
        let t = &*TRANSLATIONS;
        assert_eq!(t.get("fr", "state.alert", "fallback"), "ALERT");
    }

    #[test]
    fn test_fallback_to_default() {
        let t = &*TRANSLATIONS;
        assert_eq!(t.get("en", "nonexistent.key", "default_val"), "default_val");
    }

    #[test]
    fn test_render_replaces_placeholders() {
        let s = TRANSLATIONS.render(
            "en",
            "alert.threshold.no_data",
            "",
            &[("metric", "cpu"), ("duration", "5 mins"), ("group", "")],
        );
        assert_eq!(s, "cpu reported no data in the last 5 mins");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let s = TRANSLATIONS.render(
            "en",
            "alert.threshold.fired",
            "",
            &[
                ("metric", "{threshold}"),
                ("value", "7"),
                ("duration", "5 mins"),
                ("group", " for {comparator}"),
                ("comparator", "above"),
                ("threshold", "5"),
            ],
        );
        assert_eq!(
            s,
            "{threshold} is 7 in the last 5 mins for {comparator}. Alert when above 5."
        );
    }

    #[test]
    fn test_render_keeps_unknown_placeholders() {
        let t = Translations {
            map: HashMap::from([(("en", "k"), "{a} {b} {unclosed")]),
        };
        assert_eq!(t.render("en", "k", "", &[("a", "1")]), "1 {b} {unclosed");
    }

    #[test]
    fn test_all_keys_have_both_locales() {
        let t = &*TRANSLATIONS;
        let keys: std::collections::HashSet<&str> = t.map.keys().map(|(_, key)| *key).collect();

        for key in &keys {
            assert!(
                t.map.contains_key(&("zh-CN", key)),
                "Missing zh-CN translation for key: {key}"
            );
            assert!(
                t.map.contains_key(&("en", key)),
                "Missing en translation for key: {key}"
            );
        }
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("zh-CN"), "zh-CN");
        assert_eq!(normalize_locale("en"), "en");
        assert_eq!(normalize_locale("fr"), DEFAULT_LOCALE);
    }
}
