use chrono::{DateTime, Utc};
use icalendar::parser::{Calendar, Component, Parameter, Property};

use crate::parser;

/// Wrap a parsed calendar into a synthetic VCALENDAR component.
///
/// The icalendar parser exposes the top-level object as bare property
/// and component lists, while calendar-query filters address VCALENDAR
/// itself as a component.
pub fn vcalendar_root(ics: Calendar<'_>) -> Component<'_> {
    Component {
        name: "VCALENDAR".into(),
        properties: ics.properties,
        components: ics.components,
    }
}

struct Entry<'a> {
    comp: &'a Component<'a>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Read-only index over a component tree.
///
/// Parent links are arena indices, not owning back-references: the tree
/// borrows the components and is discarded with the request.
pub struct Tree<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> Tree<'a> {
    pub fn new(root: &'a Component<'a>) -> Self {
        let mut entries = Vec::new();
        index(&mut entries, root, None);
        Self { entries }
    }

    pub fn root(&self) -> Node<'_> {
        Node { tree: self, idx: 0 }
    }
}

fn index<'a>(entries: &mut Vec<Entry<'a>>, comp: &'a Component<'a>, parent: Option<usize>) -> usize {
    let idx = entries.len();
    entries.push(Entry {
        comp,
        parent,
        children: Vec::new(),
    });
    for child in comp.components.iter() {
        let child_idx = index(entries, child, Some(idx));
        entries[idx].children.push(child_idx);
    }
    idx
}

/// Handle on one component of a [`Tree`]. Cheap to copy.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a Tree<'a>,
    idx: usize,
}

impl<'a> Node<'a> {
    pub fn name(&self) -> &'a str {
        self.tree.entries[self.idx].comp.name.as_str()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        let tree = self.tree;
        self.tree.entries[self.idx]
            .parent
            .map(|idx| Node { tree, idx })
    }

    /// Child components carrying this name, in document order.
    pub fn children<'b>(&self, name: &'b str) -> impl Iterator<Item = Node<'a>> + 'b
    where
        'a: 'b,
    {
        let tree = self.tree;
        tree.entries[self.idx]
            .children
            .iter()
            .map(move |&idx| Node { tree, idx })
            .filter(move |node| node.name() == name)
    }

    /// Properties carrying this name, in document order.
    pub fn properties<'b>(&self, name: &'b str) -> impl Iterator<Item = &'a Property<'a>> + 'b
    where
        'a: 'b,
    {
        let tree = self.tree;
        tree.entries[self.idx]
            .comp
            .properties
            .iter()
            .filter(move |prop| prop.name.as_str() == name)
    }

    /// First property with this name, if any.
    pub fn property(&self, name: &str) -> Option<&'a Property<'a>> {
        self.tree.entries[self.idx]
            .comp
            .properties
            .iter()
            .find(|prop| prop.name.as_str() == name)
    }

    /// Decoded UTC value of the first `name` property.
    pub fn property_date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.property(name)
            .and_then(|prop| parser::date_time(prop.val.as_str()))
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("idx", &self.idx)
            .finish()
    }
}

/// Parameters of a property carrying this name, in document order.
pub fn parameters<'a, 'b>(
    prop: &'a Property<'a>,
    name: &'b str,
) -> impl Iterator<Item = &'a Parameter<'a>> + 'b
where
    'a: 'b,
{
    prop.params
        .iter()
        .filter(move |param| param.key.as_str() == name)
}

/// Value of the first `name` parameter, if the parameter carries one.
pub fn parameter_value<'a>(prop: &'a Property<'a>, name: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|param| param.key.as_str() == name)
        .and_then(|param| param.val.as_ref())
        .map(|val| val.as_str())
}
