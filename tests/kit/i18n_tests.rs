//! Translation Loading Tests

use service_kit::i18n::Language;
use service_kit::shared::KitError;
use service_kit::Kit;

use crate::common::{kit_config, write_locales};

#[tokio::test]
async fn test_kit_loads_translation_directory() {
    let locales = write_locales(&[
        (
            "en",
            r#"{"greeting": {"hello": "Hello, %s!"}, "items": "%d items"}"#,
        ),
        ("zh", r#"{"greeting": {"hello": "你好, %s!"}}"#),
        ("ja", "not json"),
    ]);
    let extra = format!(
        "i18n:\n  directory: \"{}\"\n",
        locales.path().display()
    );

    let kit = Kit::init(kit_config("kit_i18n", &extra)).await.unwrap();
    let translator = kit.translator();

    assert_eq!(translator.translate("greeting.hello", &[&"Ada"]), "Hello, Ada!");
    assert_eq!(
        translator.translate_with_lang(Language::Zh, "greeting.hello", &[&"Ada"]),
        "你好, Ada!"
    );
    // Missing in zh, falls back to the default language
    assert_eq!(
        translator.translate_with_lang(Language::Zh, "items", &[&3]),
        "3 items"
    );
    // Malformed ja file is skipped
    assert!(!translator.contains(Language::Ja, "greeting.hello"));
}

#[tokio::test]
async fn test_missing_default_language_file_fails_init() {
    let locales = write_locales(&[("zh", r#"{"a": "b"}"#)]);
    let extra = format!(
        "i18n:\n  directory: \"{}\"\n",
        locales.path().display()
    );

    let err = Kit::init(kit_config("kit_i18n_missing", &extra))
        .await
        .unwrap_err();
    assert!(matches!(err, KitError::InvalidArgument(_)));
}
