//! 叙事内容的领域模型
//!
//! 作者拥有多个情节；世界与情节各自拥有多个角色。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Model, ModelMeta, Relation, boolean_field, datetime_field, json_field, reference_field,
    string_field, text_field,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Author {
    pub const PLOTS: Relation = Relation {
        name: "plots",
        table: "plots",
        foreign_key: "author_id",
    };

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            bio: None,
        }
    }
}

impl Model for Author {
    fn meta() -> ModelMeta {
        ModelMeta::new(
            "authors",
            vec![string_field("name").required().unique(), text_field("bio")],
        )
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub author_id: i64,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plot {
    pub const CHARACTERS: Relation = Relation {
        name: "characters",
        table: "characters",
        foreign_key: "plot_id",
    };

    pub fn new(author_id: i64, title: impl Into<String>) -> Self {
        Self {
            id: None,
            author_id,
            title: title.into(),
            summary: None,
            created_at: Utc::now(),
        }
    }
}

impl Model for Plot {
    fn meta() -> ModelMeta {
        ModelMeta::new(
            "plots",
            vec![
                reference_field("author_id", "authors").required(),
                string_field("title").required(),
                text_field("summary"),
                datetime_field("created_at").required(),
            ],
        )
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl World {
    pub const CHARACTERS: Relation = Relation {
        name: "characters",
        table: "characters",
        foreign_key: "world_id",
    };

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
        }
    }
}

impl Model for World {
    fn meta() -> ModelMeta {
        ModelMeta::new(
            "worlds",
            vec![string_field("name").required(), text_field("description")],
        )
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub world_id: i64,
    #[serde(default)]
    pub plot_id: Option<i64>,
    pub name: String,
    /// 性格标签
    #[serde(default)]
    pub traits: Vec<String>,
    pub is_active: bool,
}

impl Character {
    pub fn new(world_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            world_id,
            plot_id: None,
            name: name.into(),
            traits: Vec::new(),
            is_active: true,
        }
    }
}

impl Model for Character {
    fn meta() -> ModelMeta {
        ModelMeta::new(
            "characters",
            vec![
                reference_field("world_id", "worlds").required(),
                reference_field("plot_id", "plots"),
                string_field("name").required(),
                json_field("traits"),
                boolean_field("is_active").required(),
            ],
        )
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}
