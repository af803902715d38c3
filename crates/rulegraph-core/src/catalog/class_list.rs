//! Class-list filter parsing.
//!
//! A class-list filter names classes schema by schema:
//!
//! ```text
//! Schema:ClassA,ClassB;OtherSchema:*;E:Schema:ClassC;PE:Schema:ClassD;Schema:=ClassE
//! ```
//!
//! - groups are separated by `;`, items within a group by `,`
//! - `*` stands for every most-base entity class of the schema
//! - includes are polymorphic unless the class is prefixed with `=`
//! - `E:` excludes the listed classes exactly, `PE:` excludes them polymorphically
//!
//! When a class is mentioned more than once, the last mention wins. Unknown
//! schemas, unknown classes and malformed tokens are skipped.

use std::collections::HashMap;

use logos::Logos;
use tracing::debug;

use super::schema::{ClassId, SchemaSet};
use crate::query::{SelectClass, SupportedClassFlags};

/// Tokens of the class-list filter language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("*")]
    Star,
    #[token("=")]
    Exact,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Tokenize filter text. Unrecognized characters become `None` entries.
pub fn tokenize(text: &str) -> Vec<Option<Token>> {
    Token::lexer(text).map(Result::ok).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GroupMode {
    Include,
    Exclude,
    PolymorphicExclude,
}

/// A parsed class-list filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassListFilter {
    entries: Vec<SelectClass>,
}

impl ClassListFilter {
    /// Parse filter text against a schema set.
    ///
    /// Exclusion groups are ignored unless `support_exclusion` is set.
    pub fn parse(schemas: &SchemaSet, text: &str, support_exclusion: bool) -> Self {
        let mut parser = Parser {
            schemas,
            tokens: tokenize(text),
            pos: 0,
            support_exclusion,
            entries: Vec::new(),
            positions: HashMap::new(),
        };
        parser.parse();
        Self {
            entries: parser.entries,
        }
    }

    /// Build a filter from select classes, flagging them as polymorphic or exact includes.
    pub fn from_includes(classes: impl IntoIterator<Item = SelectClass>) -> Self {
        let mut filter = Self::default();
        for select in classes {
            let mut flags = SupportedClassFlags::INCLUDE;
            if select.polymorphic {
                flags = flags | SupportedClassFlags::POLYMORPHIC;
            }
            filter.set(SelectClass::with_flags(select.class, flags));
        }
        filter
    }

    fn set(&mut self, entry: SelectClass) {
        match self.entries.iter().position(|e| e.class == entry.class) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    /// All entries, in order of first mention.
    pub fn entries(&self) -> &[SelectClass] {
        &self.entries
    }

    /// Check if the filter names no classes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Included classes.
    pub fn includes(&self) -> impl Iterator<Item = &SelectClass> {
        self.entries.iter().filter(|e| !e.is_exclude())
    }

    /// Excluded classes.
    pub fn excludes(&self) -> impl Iterator<Item = &SelectClass> {
        self.entries.iter().filter(|e| e.is_exclude())
    }

    /// Check whether the filter has any include entries.
    pub fn has_includes(&self) -> bool {
        self.includes().next().is_some()
    }

    /// Entry for `class`, if mentioned.
    pub fn get(&self, class: ClassId) -> Option<&SelectClass> {
        self.entries.iter().find(|e| e.class == class)
    }

    /// Check whether `class` is accepted by the include entries.
    ///
    /// A filter without includes accepts everything not excluded.
    pub fn accepts(&self, schemas: &SchemaSet, class: ClassId) -> bool {
        let included = !self.has_includes()
            || self.includes().any(|e| {
                if e.polymorphic {
                    schemas.is(class, e.class)
                } else {
                    e.class == class
                }
            });
        included && !self.is_excluded(schemas, class)
    }

    /// Check whether `class` is excluded.
    pub fn is_excluded(&self, schemas: &SchemaSet, class: ClassId) -> bool {
        self.excludes().any(|e| {
            if e.polymorphic {
                schemas.is(class, e.class)
            } else {
                e.class == class
            }
        })
    }

    /// Render the canonical filter text.
    pub fn to_filter_string(&self, schemas: &SchemaSet) -> String {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for entry in &self.entries {
            let class = schemas.class(entry.class);
            let schema = &schemas.schema(class.schema).name;
            let (marker, item) = match (entry.is_exclude(), entry.polymorphic) {
                (true, true) => ("PE:", class.name.clone()),
                (true, false) => ("E:", class.name.clone()),
                (false, true) => ("", class.name.clone()),
                (false, false) => ("", format!("={}", class.name)),
            };
            let head = format!("{}{}", marker, schema);
            match groups.last_mut() {
                Some((last_head, items)) if *last_head == head => items.push(item),
                _ => groups.push((head, vec![item])),
            }
        }
        groups
            .into_iter()
            .map(|(head, items)| format!("{}:{}", head, items.join(",")))
            .collect::<Vec<_>>()
            .join(";")
    }
}

struct Parser<'a> {
    schemas: &'a SchemaSet,
    tokens: Vec<Option<Token>>,
    pos: usize,
    support_exclusion: bool,
    entries: Vec<SelectClass>,
    positions: HashMap<ClassId, usize>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Option<Token>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Option<Token>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn skip_group(&mut self) {
        while let Some(token) = self.next() {
            if token == Some(Token::Semicolon) {
                break;
            }
        }
    }

    /// Skip the rest of the group unless `last` already ended it.
    fn recover(&mut self, last: Option<Option<Token>>) {
        if !matches!(last, None | Some(Some(Token::Semicolon))) {
            self.skip_group();
        }
    }

    fn parse(&mut self) {
        while self.pos < self.tokens.len() {
            self.parse_group();
        }
    }

    /// Consume an `E:` or `PE:` marker. A marker is only recognized when a
    /// `Schema:` head follows, so schemas named `E` or `PE` stay usable.
    fn group_mode(&mut self) -> GroupMode {
        let mode = match self.tokens.get(self.pos..self.pos + 4) {
            Some([Some(Token::Ident(marker)), Some(Token::Colon), Some(Token::Ident(_)), Some(Token::Colon)]) => {
                match marker.as_str() {
                    "E" => GroupMode::Exclude,
                    "PE" => GroupMode::PolymorphicExclude,
                    _ => return GroupMode::Include,
                }
            }
            _ => return GroupMode::Include,
        };
        self.pos += 2;
        mode
    }

    fn parse_group(&mut self) {
        if let Some(Some(Token::Semicolon)) = self.peek() {
            self.pos += 1;
            return;
        }
        let mode = self.group_mode();

        let schema_name = match self.next() {
            Some(Some(Token::Ident(name))) => name,
            other => {
                debug!(token = ?other, "Expected schema name in class list");
                self.recover(other);
                return;
            }
        };
        match self.next() {
            Some(Some(Token::Colon)) => {}
            other => {
                debug!(schema = %schema_name, token = ?other, "Expected ':' after schema name");
                self.recover(other);
                return;
            }
        }
        if self.schemas.schema_id(&schema_name).is_none() {
            debug!(schema = %schema_name, "Skipping class list group of unknown schema");
            self.skip_group();
            return;
        }
        if mode != GroupMode::Include && !self.support_exclusion {
            debug!(schema = %schema_name, "Exclusions not supported here, skipping group");
            self.skip_group();
            return;
        }

        loop {
            match self.next() {
                Some(Some(Token::Star)) => {
                    for class in most_base_entity_classes(self.schemas, &schema_name) {
                        self.add(class, mode, true);
                    }
                }
                Some(Some(Token::Exact)) => match self.next() {
                    Some(Some(Token::Ident(name))) => self.add_named(&schema_name, &name, mode, false),
                    other => {
                        debug!(token = ?other, "Expected class name after '='");
                        self.recover(other);
                        return;
                    }
                },
                Some(Some(Token::Ident(name))) => {
                    let polymorphic = mode != GroupMode::Exclude;
                    self.add_named(&schema_name, &name, mode, polymorphic);
                }
                other => {
                    debug!(token = ?other, "Skipping malformed class list item");
                    self.recover(other);
                    return;
                }
            }
            match self.next() {
                Some(Some(Token::Comma)) => continue,
                None | Some(Some(Token::Semicolon)) => return,
                other => {
                    debug!(token = ?other, "Unexpected token in class list");
                    self.recover(other);
                    return;
                }
            }
        }
    }

    fn add_named(&mut self, schema_name: &str, class_name: &str, mode: GroupMode, polymorphic: bool) {
        match self.schemas.find_class(schema_name, class_name) {
            Some(class) => self.add(class, mode, polymorphic),
            None => debug!(schema = %schema_name, class = %class_name, "Skipping unknown class"),
        }
    }

    fn add(&mut self, class: ClassId, mode: GroupMode, polymorphic: bool) {
        let mut flags = match mode {
            GroupMode::Include => SupportedClassFlags::INCLUDE,
            GroupMode::Exclude | GroupMode::PolymorphicExclude => SupportedClassFlags::EXCLUDE,
        };
        if polymorphic {
            flags = flags | SupportedClassFlags::POLYMORPHIC;
        }
        let entry = SelectClass::with_flags(class, flags);
        match self.positions.get(&class) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.positions.insert(class, self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

/// Entity classes of a schema that have no entity base class in the same schema.
pub fn most_base_entity_classes(schemas: &SchemaSet, schema_name: &str) -> Vec<ClassId> {
    let Some(schema_id) = schemas.schema_id(schema_name) else {
        return Vec::new();
    };
    schemas
        .schema(schema_id)
        .classes
        .iter()
        .copied()
        .filter(|&id| {
            let class = schemas.class(id);
            class.is_entity()
                && !class.base_classes.iter().any(|base| {
                    let base = schemas.class(*base);
                    base.is_entity() && base.schema == schema_id
                })
        })
        .collect()
}

/// A supported-schemas filter: comma-separated schema names, `E:` prefix excludes them instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaList {
    names: Vec<String>,
    exclude: bool,
}

impl SchemaList {
    /// Parse supported-schemas text.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (exclude, rest) = match text.strip_prefix("E:") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let names = rest
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { names, exclude }
    }

    /// Check whether a schema is accepted. An empty list accepts every schema.
    pub fn accepts(&self, schema_name: &str) -> bool {
        if self.names.is_empty() {
            return true;
        }
        let listed = self.names.iter().any(|n| *n == schema_name.to_lowercase());
        listed != self.exclude
    }
}
