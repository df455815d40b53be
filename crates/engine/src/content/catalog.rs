use std::collections::HashMap;

pub const DEFAULT_MOVE_SPEED: f32 = 4.0;

/// Resolved asset definition for one character class.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDefinition {
    pub def_name: String,
    pub label: String,
    /// Tiles per second.
    pub move_speed: f32,
    pub intro_seconds: f32,
    pub avatar: Option<String>,
}

impl CharacterDefinition {
    pub fn new(def_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            def_name: def_name.into(),
            label: label.into(),
            move_speed: DEFAULT_MOVE_SPEED,
            intro_seconds: 0.0,
            avatar: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CharacterCatalog {
    definitions: Vec<CharacterDefinition>,
    index_by_name: HashMap<String, usize>,
}

impl CharacterCatalog {
    pub(crate) fn from_definitions(definitions: Vec<CharacterDefinition>) -> Self {
        let index_by_name = definitions
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.def_name.clone(), idx))
            .collect();
        Self {
            definitions,
            index_by_name,
        }
    }

    pub fn get(&self, def_name: &str) -> Option<&CharacterDefinition> {
        self.index_by_name
            .get(def_name)
            .and_then(|idx| self.definitions.get(*idx))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<CharacterDefinition> for CharacterCatalog {
    fn from_iter<I: IntoIterator<Item = CharacterDefinition>>(iter: I) -> Self {
        Self::from_definitions(iter.into_iter().collect())
    }
}
