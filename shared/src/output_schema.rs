//! Declarative description of the structured output a generation request
//! must conform to: one function whose single argument is a list of records.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    TextEnum(Vec<String>),
    IntegerEnum(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub function_name: String,
    pub function_description: String,
    pub list_name: String,
    pub list_description: String,
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(function_name: &str, function_description: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            function_description: function_description.to_string(),
            list_name: "items".to_string(),
            list_description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn list(mut self, name: &str, description: &str) -> Self {
        self.list_name = name.to_string();
        self.list_description = description.to_string();
        self
    }

    pub fn field(mut self, name: &str, description: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            description: description.to_string(),
            kind,
        });
        self
    }

    /// JSON schema of the function parameters. Every field is required.
    pub fn parameters(&self) -> Value {
        let mut props = Map::new();
        for f in &self.fields {
            let mut p = match &f.kind {
                FieldKind::Text => json!({ "type": "string" }),
                FieldKind::Integer => json!({ "type": "integer" }),
                FieldKind::TextEnum(values) => json!({ "type": "string", "enum": values }),
                FieldKind::IntegerEnum(values) => json!({ "type": "integer", "enum": values }),
            };
            p["description"] = Value::String(f.description.clone());
            props.insert(f.name.clone(), p);
        }
        let required: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        let mut list = Map::new();
        list.insert(
            self.list_name.clone(),
            json!({
                "type": "array",
                "description": self.list_description,
                "items": {
                    "type": "object",
                    "properties": props,
                    "required": required,
                }
            }),
        );

        json!({
            "type": "object",
            "properties": list,
            "required": [self.list_name],
        })
    }

    /// Tool definition for the chat-completions `tools` array.
    pub fn tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.function_name,
                "description": self.function_description,
                "parameters": self.parameters(),
            }
        })
    }

    /// Forces the model to answer through this schema's function.
    pub fn tool_choice(&self) -> Value {
        json!({ "type": "function", "function": { "name": self.function_name } })
    }
}

/// Integer enumeration for 1..=5 scales.
pub fn scale_kind() -> FieldKind {
    FieldKind::IntegerEnum((1..=5).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_required_fields_and_enums() {
        let schema = OutputSchema::new("tagger", "tags things")
            .list("themes", "tagged themes")
            .field("theme", "theme name", FieldKind::TextEnum(vec!["Price".into()]))
            .field("urgency", "1-5", scale_kind());
        let tool = schema.tool();
        assert_eq!(tool["function"]["name"], "tagger");
        let params = &tool["function"]["parameters"];
        assert_eq!(params["required"], json!(["themes"]));
        let items = &params["properties"]["themes"]["items"];
        assert_eq!(items["required"], json!(["theme", "urgency"]));
        assert_eq!(items["properties"]["theme"]["enum"], json!(["Price"]));
        assert_eq!(items["properties"]["urgency"]["enum"], json!([1, 2, 3, 4, 5]));
        assert_eq!(schema.tool_choice()["function"]["name"], "tagger");
    }
}
