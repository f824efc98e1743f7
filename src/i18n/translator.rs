//! Translation tables and lookup.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{Language, DEFAULT_LANGUAGE};
use crate::shared::{KitError, KitResult};

type Table = HashMap<String, String>;

/// Thread-safe translation store.
///
/// Lookups fall back from the requested language to the default language,
/// and finally to the key itself.
#[derive(Debug)]
pub struct Translator {
    language: RwLock<Language>,
    default_language: Language,
    translations: RwLock<HashMap<Language, Table>>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl Translator {
    pub fn new(language: Language) -> Self {
        Self {
            language: RwLock::new(language),
            default_language: DEFAULT_LANGUAGE,
            translations: RwLock::new(HashMap::new()),
        }
    }

    /// Use `fallback` instead of English as the last language tried.
    pub fn with_fallback(mut self, fallback: Language) -> Self {
        self.default_language = fallback;
        self
    }

    pub fn language(&self) -> Language {
        *self.language.read()
    }

    pub fn set_language(&self, language: Language) {
        *self.language.write() = language;
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Translate using the current language.
    pub fn translate(&self, key: &str, args: &[&dyn Display]) -> String {
        self.translate_with_lang(self.language(), key, args)
    }

    pub fn translate_with_lang(&self, lang: Language, key: &str, args: &[&dyn Display]) -> String {
        let template = {
            let translations = self.translations.read();
            let lookup = |l: Language| translations.get(&l).and_then(|t| t.get(key)).cloned();

            lookup(lang).or_else(|| {
                if lang != self.default_language {
                    lookup(self.default_language)
                } else {
                    None
                }
            })
        };

        match template {
            Some(template) if args.is_empty() => template,
            Some(template) => format_template(&template, args),
            None => key.to_string(),
        }
    }

    pub fn insert(&self, lang: Language, key: impl Into<String>, value: impl Into<String>) {
        self.translations
            .write()
            .entry(lang)
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn contains(&self, lang: Language, key: &str) -> bool {
        self.translations
            .read()
            .get(&lang)
            .is_some_and(|t| t.contains_key(key))
    }

    /// Load `<dir>/<code>.json` for every supported language.
    ///
    /// The default language file is required; others are skipped when
    /// missing or malformed. Entries are merged into existing tables.
    #[instrument(skip(self, dir), fields(dir = %dir.as_ref().display()))]
    pub fn load_translations(&self, dir: impl AsRef<Path>) -> KitResult<()> {
        let dir = dir.as_ref();

        for lang in Language::ALL {
            let path = dir.join(format!("{}.json", lang.code()));
            match read_table(&path) {
                Ok(table) => {
                    debug!(language = %lang, entries = table.len(), "Loaded translations");
                    self.translations.write().entry(lang).or_default().extend(table);
                }
                Err(e) if lang == self.default_language => {
                    return Err(KitError::InvalidArgument(format!(
                        "failed to load default language file {}: {}",
                        path.display(),
                        e
                    )));
                }
                Err(e) => {
                    debug!(language = %lang, error = %e, "Skipping translation file");
                }
            }
        }

        info!("Translations loaded");
        Ok(())
    }
}

fn read_table(path: &Path) -> KitResult<Table> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let mut table = Table::new();
    flatten("", &value, &mut table);
    Ok(table)
}

fn flatten(prefix: &str, value: &Value, out: &mut Table) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other if !prefix.is_empty() => {
            out.insert(prefix.to_string(), other.to_string());
        }
        _ => {}
    }
}

/// Substitute printf-style verbs (`%s %d %v %f`) positionally.
///
/// `%%` yields a literal `%`. Verbs without a matching argument are kept
/// verbatim and surplus arguments are ignored.
pub fn format_template(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(verb @ ('s' | 'd' | 'v' | 'f')) => {
                chars.next();
                match args.next() {
                    Some(arg) => out.push_str(&arg.to_string()),
                    None => {
                        out.push('%');
                        out.push(verb);
                    }
                }
            }
            _ => out.push('%'),
        }
    }

    out
}
