//! XML project document codec.
//!
//! # Responsibility
//! - Parse persisted project markup into a `Document`, synthesizing schema
//!   defaults for absent recognized nodes.
//! - Render a `Document` back into canonical markup.
//!
//! # Invariants
//! - Leaf text is kept verbatim; nothing is trimmed or normalized.
//! - Parsing is all-or-nothing: any structural error yields
//!   `MalformedDocument` and no partial document.
//!
//! Layout:
//!
//! ```xml
//! <Project>
//!   <Settings><Setting Name="BaseDirectory">/data</Setting></Settings>
//!   <Instruments>
//!     <Instrument id="1">
//!       <Name>ADCP 1</Name>
//!       <DataFile>raw/transect.000</DataFile>
//!       <MaskEchoIntensity Enabled="true"><Min>0</Min><Max>255</Max></MaskEchoIntensity>
//!       <Survey>2</Survey>
//!     </Instrument>
//!   </Instruments>
//! </Project>
//! ```

use crate::model::entity::{Entity, EntityKey, EntityKind};
use crate::model::mask::{MaskBounds, MaskRange};
use crate::model::schema::schema;
use crate::store::document::Document;
use crate::store::{StoreError, StoreResult};
use log::warn;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

const ROOT_ELEMENT: &str = "Project";
const SETTINGS_ELEMENT: &str = "Settings";
const SETTING_ELEMENT: &str = "Setting";
const SETTING_NAME_ATTR: &str = "Name";
const ID_ATTR: &str = "id";
pub(crate) const NAME_ELEMENT: &str = "Name";
const ENABLED_ATTR: &str = "Enabled";
const MIN_ELEMENT: &str = "Min";
const MAX_ELEMENT: &str = "Max";
const TARGET_ELEMENT: &str = "Target";

static ELEMENT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}_][\p{L}\p{N}_.\-]*$").expect("valid element name regex")
});

/// Returns whether `name` can be written as an element name and read back.
pub(crate) fn is_element_name(name: &str) -> bool {
    ELEMENT_NAME_RE.is_match(name)
}

/// Generic element tree produced by the first parsing pass.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Text of a leaf element; element-only content has no text.
    fn leaf_text(&self) -> String {
        if self.children.is_empty() {
            self.text.clone()
        } else {
            String::new()
        }
    }
}

/// Parses project markup into a document.
pub fn parse_document(xml: &str) -> StoreResult<Document> {
    let root = parse_tree(xml)?;
    if root.name != ROOT_ELEMENT {
        return Err(malformed(format!(
            "expected root element `{ROOT_ELEMENT}`, found `{}`",
            root.name
        )));
    }

    let mut document = Document::new();
    for section in &root.children {
        if section.name == SETTINGS_ELEMENT {
            read_settings(section, &mut document)?;
            continue;
        }
        let Some(kind) = EntityKind::from_list_element(&section.name) else {
            warn!(
                "event=document_parse module=codec status=skip reason=unknown_section section={}",
                section.name
            );
            continue;
        };
        for item in &section.children {
            if item.name != kind.item_element() {
                warn!(
                    "event=document_parse module=codec status=skip reason=unexpected_item section={} item={}",
                    section.name, item.name
                );
                continue;
            }
            let entity = read_entity(kind, item)?;
            document.insert(entity).map_err(|err| match err {
                StoreError::DuplicateEntity(key) => {
                    malformed(format!("duplicate entity identity `{key}`"))
                }
                other => other,
            })?;
        }
    }
    Ok(document)
}

/// Renders a document into canonical project markup.
pub fn render_document(document: &Document) -> StoreResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;

    emit(&mut writer, Event::Start(BytesStart::new(SETTINGS_ELEMENT)))?;
    for (name, value) in document.settings() {
        let mut start = BytesStart::new(SETTING_ELEMENT);
        start.push_attribute((SETTING_NAME_ATTR, name));
        write_leaf_with(&mut writer, start, SETTING_ELEMENT, value)?;
    }
    emit(&mut writer, Event::End(BytesEnd::new(SETTINGS_ELEMENT)))?;

    for kind in EntityKind::ALL {
        emit(&mut writer, Event::Start(BytesStart::new(kind.list_element())))?;
        for entity in document.entities(kind) {
            write_entity(&mut writer, entity)?;
        }
        emit(&mut writer, Event::End(BytesEnd::new(kind.list_element())))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|err| StoreError::Encode(err.to_string()))
}

fn parse_tree(xml: &str) -> StoreResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader.read_event().map_err(|err| {
            malformed(format!(
                "xml syntax error at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => stack.push(node_from_start(&start)?),
            Event::Empty(start) => {
                let node = node_from_start(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let value = text
                        .unescape()
                        .map_err(|err| malformed(format!("invalid text content: {err}")))?;
                    top.text.push_str(&value);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let value = String::from_utf8(data.into_inner().into_owned())
                        .map_err(|err| malformed(format!("invalid CDATA content: {err}")))?;
                    top.text.push_str(&value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("element `{}` is never closed", open.name)));
    }
    root.ok_or_else(|| malformed("document has no root element".to_string()))
}

fn node_from_start(start: &BytesStart<'_>) -> StoreResult<XmlNode> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| malformed(format!("invalid attribute on `{name}`: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(format!("invalid attribute value on `{name}`: {err}")))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name,
        attrs,
        ..XmlNode::default()
    })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> StoreResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed("document has more than one root element".to_string()));
    }
    *root = Some(node);
    Ok(())
}

fn read_settings(section: &XmlNode, document: &mut Document) -> StoreResult<()> {
    for setting in &section.children {
        if setting.name != SETTING_ELEMENT {
            continue;
        }
        let name = setting.attr(SETTING_NAME_ATTR).ok_or_else(|| {
            malformed(format!("`{SETTING_ELEMENT}` is missing `{SETTING_NAME_ATTR}`"))
        })?;
        document.set_setting(name, setting.leaf_text());
    }
    Ok(())
}

fn read_entity(kind: EntityKind, item: &XmlNode) -> StoreResult<Entity> {
    let id = item
        .attr(ID_ATTR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            malformed(format!(
                "`{}` element is missing a non-empty `{ID_ATTR}` attribute",
                kind.item_element()
            ))
        })?;

    let declared = schema(kind);
    let name = item
        .child(NAME_ELEMENT)
        .map(XmlNode::leaf_text)
        .unwrap_or_default();
    let mut entity = Entity::new(kind, id, name);

    let mut seen_name = false;
    for child in &item.children {
        if child.name == NAME_ELEMENT {
            if seen_name {
                warn!(
                    "event=document_parse module=codec status=skip reason=duplicate_name entity={}",
                    entity.key()
                );
            }
            seen_name = true;
            continue;
        }
        if let Some(slot) = declared.slot(&child.name) {
            let target_id = child.leaf_text();
            let target_id = target_id.trim();
            // An empty reference node means "unset".
            if !target_id.is_empty() {
                entity.add_reference(slot.name, EntityKey::new(slot.target, target_id));
            }
            continue;
        }
        if let Some(enabled) = child.attr(ENABLED_ATTR) {
            entity.set_mask(child.name.clone(), read_mask(enabled, child));
            continue;
        }
        if !child.children.is_empty() {
            warn!(
                "event=document_parse module=codec status=skip reason=nested_node entity={} node={}",
                entity.key(),
                child.name
            );
            continue;
        }
        entity.set_field(child.name.clone(), child.text.clone());
    }

    declared.apply_defaults(&mut entity);
    Ok(entity)
}

fn read_mask(enabled: &str, node: &XmlNode) -> MaskRange {
    let enabled = enabled.trim().eq_ignore_ascii_case("true");
    let bounds = match node.child(TARGET_ELEMENT) {
        Some(target) => MaskBounds::Target(target.leaf_text()),
        None => MaskBounds::Range {
            min: node.child(MIN_ELEMENT).map(XmlNode::leaf_text),
            max: node.child(MAX_ELEMENT).map(XmlNode::leaf_text),
        },
    };
    MaskRange { enabled, bounds }
}

fn write_entity(writer: &mut Writer<Vec<u8>>, entity: &Entity) -> StoreResult<()> {
    let element = entity.kind.item_element();
    let mut start = BytesStart::new(element);
    start.push_attribute((ID_ATTR, entity.id.as_str()));
    emit(writer, Event::Start(start))?;

    write_leaf(writer, NAME_ELEMENT, &entity.name)?;
    for (name, value) in &entity.fields {
        ensure_element_name(entity, name)?;
        write_leaf(writer, name, value)?;
    }
    for (name, mask) in &entity.masks {
        ensure_element_name(entity, name)?;
        let mut start = BytesStart::new(name.as_str());
        start.push_attribute((ENABLED_ATTR, if mask.enabled { "true" } else { "false" }));
        emit(writer, Event::Start(start))?;
        match &mask.bounds {
            MaskBounds::Range { min, max } => {
                if let Some(min) = min {
                    write_leaf(writer, MIN_ELEMENT, min)?;
                }
                if let Some(max) = max {
                    write_leaf(writer, MAX_ELEMENT, max)?;
                }
            }
            MaskBounds::Target(target) => write_leaf(writer, TARGET_ELEMENT, target)?,
        }
        emit(writer, Event::End(BytesEnd::new(name.as_str())))?;
    }
    for reference in &entity.refs {
        write_leaf(writer, &reference.slot, &reference.target.id)?;
    }

    emit(writer, Event::End(BytesEnd::new(element)))
}

fn ensure_element_name(entity: &Entity, name: &str) -> StoreResult<()> {
    if is_element_name(name) {
        Ok(())
    } else {
        Err(StoreError::Encode(format!(
            "{} has a node named `{name}` that is not a valid element name",
            entity.key()
        )))
    }
}

fn write_leaf(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> StoreResult<()> {
    write_leaf_with(writer, BytesStart::new(name), name, text)
}

fn write_leaf_with(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    name: &str,
    text: &str,
) -> StoreResult<()> {
    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> StoreResult<()> {
    writer
        .write_event(event)
        .map_err(|err| StoreError::Encode(err.to_string()))
}

fn malformed(message: String) -> StoreError {
    StoreError::MalformedDocument(message)
}
