//! The board dataset: categories, items and voice defaults.
//!
//! Publishers emit two parallel naming conventions for the same document
//! (`version`/`versao`, `items`/`itens`, ...). Both are read through
//! `DatasetWire` and folded into one canonical `Dataset`, which always
//! serializes in camelCase.

use serde::{Deserialize, Serialize};

/// Category id reserved for shortcut items shown on every page.
pub const SHORTCUTS_CATEGORY_ID: &str = "base";

const DEFAULT_LANG: &str = "pt-PT";
const DEFAULT_RATE: f64 = 1.0;
const DEFAULT_PITCH: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(from = "DatasetWire", rename_all = "camelCase")]
pub struct Dataset {
    pub version: i64,
    pub exported_at: String,
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
    pub voice_defaults: VoiceDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(from = "CategoryWire")]
pub struct Category {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(from = "ItemWire", rename_all = "camelCase")]
pub struct Item {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct VoiceDefaults {
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
}

impl Default for VoiceDefaults {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.to_string(),
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
        }
    }
}

impl Dataset {
    /// A dataset with no items is treated as absent by the loader.
    pub fn is_populated(&self) -> bool {
        !self.items.is_empty()
    }

    /// Items belonging to a category, in dataset order.
    pub fn items_in<'a>(&'a self, category_id: &'a str) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |i| i.category_id == category_id)
    }

    /// Items in the reserved shortcuts category.
    pub fn shortcuts(&self) -> impl Iterator<Item = &Item> {
        self.items_in(SHORTCUTS_CATEGORY_ID)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Parse a dataset from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Item {
    /// Icon path if one is set and non-empty.
    pub fn icon(&self) -> Option<&str> {
        self.icon_path.as_deref().filter(|p| !p.is_empty())
    }
}

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct DatasetWire {
    #[serde(default, deserialize_with = "deserialize_version")]
    versao: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_version")]
    version: Option<i64>,
    #[serde(default, rename = "exportadoEm", deserialize_with = "deserialize_string_or_number")]
    exportado_em: Option<String>,
    #[serde(default, rename = "exportedAt", deserialize_with = "deserialize_string_or_number")]
    exported_at: Option<String>,
    #[serde(default)]
    categorias: Option<Vec<Category>>,
    #[serde(default)]
    categories: Option<Vec<Category>>,
    #[serde(default)]
    pages: Option<Vec<Category>>,
    #[serde(default)]
    itens: Option<Vec<Item>>,
    #[serde(default)]
    items: Option<Vec<Item>>,
    #[serde(default)]
    voz: Option<VoiceWire>,
    #[serde(default, rename = "voiceDefaults")]
    voice_defaults: Option<VoiceWire>,
    #[serde(default)]
    defaults: Option<DefaultsWire>,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultsWire {
    #[serde(default)]
    voice: Option<VoiceWire>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct VoiceWire {
    #[serde(default)]
    lang: Option<String>,
    #[serde(default, deserialize_with = "deserialize_float")]
    rate: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_float")]
    pitch: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CategoryWire {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    id: Option<String>,
    #[serde(default)]
    nome: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemWire {
    #[serde(default)]
    texto: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    icone: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default, rename = "iconPath")]
    icon_path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    categoria: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    page: Option<String>,
    #[serde(default, rename = "categoryId", deserialize_with = "deserialize_string_or_number")]
    category_id: Option<String>,
}

/// First non-empty string among the candidates.
fn first_text(candidates: [Option<String>; 3]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

impl From<DatasetWire> for Dataset {
    fn from(wire: DatasetWire) -> Self {
        let version = wire
            .versao
            .filter(|v| *v != 0)
            .or(wire.version)
            .unwrap_or(0);
        let exported_at = first_text([wire.exported_at, wire.exportado_em, None])
            .unwrap_or_default();

        let categories = wire
            .categorias
            .or(wire.categories)
            .or(wire.pages)
            .unwrap_or_default();
        let items = wire.itens.or(wire.items).unwrap_or_default();

        let layers = [
            wire.voz,
            wire.voice_defaults,
            wire.defaults.and_then(|d| d.voice),
        ];
        let lang = layers
            .iter()
            .flatten()
            .find_map(|v| v.lang.clone().filter(|l| !l.is_empty()))
            .unwrap_or_else(|| DEFAULT_LANG.to_string());
        let rate = layers
            .iter()
            .flatten()
            .find_map(|v| v.rate)
            .unwrap_or(DEFAULT_RATE);
        let pitch = layers
            .iter()
            .flatten()
            .find_map(|v| v.pitch)
            .unwrap_or(DEFAULT_PITCH);

        Self {
            version,
            exported_at,
            categories,
            items,
            voice_defaults: VoiceDefaults { lang, rate, pitch },
        }
    }
}

impl From<CategoryWire> for Category {
    fn from(wire: CategoryWire) -> Self {
        Self {
            id: wire.id.unwrap_or_default(),
            label: first_text([wire.nome, wire.label, None]).unwrap_or_default(),
        }
    }
}

impl From<ItemWire> for Item {
    fn from(wire: ItemWire) -> Self {
        Self {
            text: first_text([wire.texto, wire.text, None]).unwrap_or_default(),
            icon_path: first_text([wire.icone, wire.icon, wire.icon_path]),
            category_id: first_text([wire.categoria, wire.page, wire.category_id])
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Lenient scalar deserializers
// ============================================================================

fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            if v.is_empty() {
                Ok(None)
            } else {
                Ok(Some(v.to_string()))
            }
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

/// Versions arrive as integers or numeric strings. Anything else is rejected.
fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match deserialize_string_or_number(deserializer)? {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(Some(v));
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
                _ => Err(D::Error::custom(format!("invalid dataset version: {}", raw))),
            }
        }
    }
}

fn deserialize_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = deserialize_string_or_number(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse::<f64>().ok()))
}
