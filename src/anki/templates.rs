use serde::Serialize;

use crate::core::models::NoteFields;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardTemplate {
    pub name: &'static str,
    pub front: &'static str,
    pub back: &'static str,
    /// Field that must be non-empty for the card to exist.
    pub required_field: usize,
}

/// A note type: field names, one template per card it generates, and shared styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteType {
    pub name: &'static str,
    pub fields: [&'static str; 6],
    pub templates: Vec<CardTemplate>,
    pub css: &'static str,
}

impl NoteType {
    pub fn vocabulary() -> Self {
        Self {
            name: "kotodeck Vocabulary",
            fields: NoteFields::NAMES,
            templates: vec![CardTemplate {
                name: "Card 1",
                front: VOCABULARY_FRONT,
                back: VOCABULARY_BACK,
                required_field: 0,
            }],
            css: CARD_CSS,
        }
    }

    pub fn core2000() -> Self {
        Self {
            name: "kotodeck Core 2000",
            fields: NoteFields::NAMES,
            templates: vec![
                CardTemplate {
                    name: "Recognition",
                    front: RECOGNITION_FRONT,
                    back: RECOGNITION_BACK,
                    required_field: 0,
                },
                CardTemplate {
                    name: "Production",
                    front: PRODUCTION_FRONT,
                    back: PRODUCTION_BACK,
                    required_field: 2,
                },
            ],
            css: CARD_CSS,
        }
    }

    pub fn for_mode(use_core2000: bool) -> Self {
        if use_core2000 {
            Self::core2000()
        } else {
            Self::vocabulary()
        }
    }

    pub fn cards_per_note(&self) -> usize {
        self.templates.len()
    }
}

const VOCABULARY_FRONT: &str = r#"<div class="japanese">{{Japanese}}</div>
{{#Audio}}{{Audio}}{{/Audio}}"#;

const VOCABULARY_BACK: &str = r#"{{FrontSide}}
<hr id="answer">
{{#Reading}}<div class="reading">{{Reading}}</div>{{/Reading}}
<div class="english">{{English}}</div>
{{#Example}}<div class="example">{{Example}}</div>{{/Example}}
{{#ExampleAudio}}{{ExampleAudio}}{{/ExampleAudio}}"#;

const RECOGNITION_FRONT: &str = r#"<div class="japanese">{{Japanese}}</div>
{{#Audio}}{{Audio}}{{/Audio}}"#;

const RECOGNITION_BACK: &str = r#"{{FrontSide}}
<hr id="answer">
{{#Reading}}<div class="reading">{{Reading}}</div>{{/Reading}}
<div class="english">{{English}}</div>
{{#Example}}<div class="example">{{Example}}</div>{{/Example}}
{{#ExampleAudio}}{{ExampleAudio}}{{/ExampleAudio}}"#;

const PRODUCTION_FRONT: &str = r#"<div class="english">{{English}}</div>"#;

const PRODUCTION_BACK: &str = r#"{{FrontSide}}
<hr id="answer">
<div class="japanese">{{Japanese}}</div>
{{#Reading}}<div class="reading">{{Reading}}</div>{{/Reading}}
{{#Audio}}{{Audio}}{{/Audio}}
{{#Example}}<div class="example">{{Example}}</div>{{/Example}}
{{#ExampleAudio}}{{ExampleAudio}}{{/ExampleAudio}}"#;

const CARD_CSS: &str = r#".card {
  font-family: "Hiragino Kaku Gothic Pro", "Noto Sans CJK JP", "Meiryo", sans-serif;
  font-size: 20px;
  text-align: center;
  color: #333;
  background-color: #fffaf0;
  padding: 20px;
}
.japanese { font-size: 40px; color: #000; margin-bottom: 15px; }
.reading { font-size: 24px; color: #1f4fbf; margin-bottom: 15px; }
.english { font-size: 24px; font-weight: bold; color: #1d8a3a; margin-bottom: 15px; }
.example {
  font-size: 18px;
  color: #666;
  line-height: 1.5;
  margin-top: 15px;
  text-align: left;
  border-left: 3px solid #ddd;
  padding-left: 10px;
}
"#;
