use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const REQUIRED_MODS_KEY: &str = "RequiredMods";
const NAME_KEY: &str = "Name";
const WORKSHOP_ID_KEY: &str = "WorkshopId";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Input a mod name or workshop id first")]
    Empty,
}

/// What to strip from `RequiredMods`. Either criterion is enough to drop an
/// entry; an absent criterion never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModFilter {
    name: Option<String>,
    workshop_id: Option<String>,
}

impl ModFilter {
    pub fn new(name: Option<&str>, workshop_id: Option<&str>) -> Result<Self, FilterError> {
        let name = non_blank(name);
        let workshop_id = non_blank(workshop_id);
        if name.is_none() && workshop_id.is_none() {
            return Err(FilterError::Empty);
        }
        Ok(Self { name, workshop_id })
    }

    pub fn matches(&self, entry: &Value) -> bool {
        let Some(entry) = entry.as_object() else {
            return false;
        };
        if let Some(name) = &self.name {
            let entry_name = entry
                .get(NAME_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default();
            if entry_name.to_lowercase() == name.to_lowercase() {
                return true;
            }
        }
        if let Some(workshop_id) = &self.workshop_id {
            if workshop_id_text(entry.get(WORKSHOP_ID_KEY)) == *workshop_id {
                return true;
            }
        }
        false
    }

    pub fn describe(&self) -> String {
        match (&self.name, &self.workshop_id) {
            (Some(name), Some(id)) => format!("\"{name}\" / workshop {id}"),
            (Some(name), None) => format!("\"{name}\""),
            (None, Some(id)) => format!("workshop {id}"),
            (None, None) => "nothing".to_string(),
        }
    }
}

/// Drops every matching entry from the document's `RequiredMods` array.
///
/// Documents that are not objects, or that carry no `RequiredMods` array, come
/// back untouched. The flag is true only when the list got shorter.
pub fn filter_document(mut document: Value, filter: &ModFilter) -> (Value, bool) {
    let Some(list) = document
        .as_object_mut()
        .and_then(|object| object.get_mut(REQUIRED_MODS_KEY))
        .and_then(Value::as_array_mut)
    else {
        return (document, false);
    };

    let before = list.len();
    list.retain(|entry| !filter.matches(entry));
    let changed = list.len() != before;
    (document, changed)
}

/// Counts the entries `filter_document` would remove.
pub fn count_matches(document: &Value, filter: &ModFilter) -> usize {
    document
        .get(REQUIRED_MODS_KEY)
        .and_then(Value::as_array)
        .map(|list| list.iter().filter(|entry| filter.matches(entry)).count())
        .unwrap_or(0)
}

fn workshop_id_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
