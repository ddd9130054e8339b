use std::collections::HashMap;

use petgraph::algo::has_path_connecting;
use petgraph::graph::NodeIndex;
use petgraph::Graph;

use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, FileDescriptorProto,
};

/// Builds a graph of messages whose edges correspond to non-repeated message-typed fields.
///
/// The graph exists to recognize recursively nested messages: since a Rust struct can't directly
/// contain a field of its own type (or a cycle of such fields), any field that closes a cycle must
/// be generated as `Box<T>` instead of `T`.
pub(crate) struct MessageGraph {
    index: HashMap<String, NodeIndex>,
    graph: Graph<String, ()>,
}

impl MessageGraph {
    pub(crate) fn new<'a>(files: impl Iterator<Item = &'a FileDescriptorProto>) -> Self {
        let mut message_graph = MessageGraph {
            index: HashMap::new(),
            graph: Graph::new(),
        };

        for file in files {
            let package = format!(
                "{}{}",
                if file.package.is_some() { "." } else { "" },
                file.package.as_deref().unwrap_or("")
            );
            for message in &file.message_type {
                message_graph.add_message(&package, message);
            }
        }

        message_graph
    }

    fn get_or_insert_index(&mut self, name: String) -> NodeIndex {
        let MessageGraph { index, graph, .. } = self;
        *index
            .entry(name.clone())
            .or_insert_with(|| graph.add_node(name))
    }

    fn add_message(&mut self, package: &str, message: &DescriptorProto) {
        let message_name = format!("{}.{}", package, message.name());
        let message_index = self.get_or_insert_index(message_name.clone());

        for field in &message.field {
            if field.r#type() == Type::Message && field.label() != Label::Repeated {
                let field_index = self.get_or_insert_index(field.type_name().to_owned());
                self.graph.add_edge(message_index, field_index, ());
            }
        }

        for nested in &message.nested_type {
            self.add_message(&message_name, nested);
        }
    }

    /// Returns `true` if a field of type `inner` declared on `outer` would close a reference
    /// cycle and must therefore be boxed.
    pub(crate) fn is_recursive(&self, outer: &str, inner: &str) -> bool {
        let (Some(&outer), Some(&inner)) = (self.index.get(outer), self.index.get(inner)) else {
            return false;
        };

        outer == inner || has_path_connecting(&self.graph, inner, outer, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

    fn field(name: &str, type_name: Option<&str>, repeated: bool) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_owned()),
            r#type: Some(if type_name.is_some() {
                Type::Message as i32
            } else {
                Type::Int32 as i32
            }),
            type_name: type_name.map(str::to_owned),
            label: Some(if repeated {
                Label::Repeated as i32
            } else {
                Label::Optional as i32
            }),
            number: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn detects_self_recursive_message() {
        let tree = DescriptorProto {
            name: Some("Tree".to_owned()),
            field: vec![field("left", Some(".pkg.Tree"), false)],
            ..Default::default()
        };
        let file = FileDescriptorProto {
            package: Some("pkg".to_owned()),
            message_type: vec![tree],
            ..Default::default()
        };
        let graph = MessageGraph::new(std::iter::once(&file));
        assert!(graph.is_recursive(".pkg.Tree", ".pkg.Tree"));
    }

    #[test]
    fn repeated_message_fields_do_not_require_boxing_detection_to_self_loop() {
        let tree = DescriptorProto {
            name: Some("Tree".to_owned()),
            field: vec![field("children", Some(".pkg.Tree"), true)],
            ..Default::default()
        };
        let file = FileDescriptorProto {
            package: Some("pkg".to_owned()),
            message_type: vec![tree],
            ..Default::default()
        };
        let graph = MessageGraph::new(std::iter::once(&file));
        // Repeated fields never contribute an edge, so there is no cycle to report even though
        // generated code will use Vec<Tree> (already heap-indirected) regardless.
        assert!(!graph.is_recursive(".pkg.Tree", ".pkg.Tree"));
    }

    #[test]
    fn detects_mutually_recursive_messages() {
        let a = DescriptorProto {
            name: Some("A".to_owned()),
            field: vec![field("b", Some(".pkg.B"), false)],
            ..Default::default()
        };
        let b = DescriptorProto {
            name: Some("B".to_owned()),
            field: vec![field("a", Some(".pkg.A"), false)],
            ..Default::default()
        };
        let file = FileDescriptorProto {
            package: Some("pkg".to_owned()),
            message_type: vec![a, b],
            ..Default::default()
        };
        let graph = MessageGraph::new(std::iter::once(&file));
        assert!(graph.is_recursive(".pkg.A", ".pkg.B"));
        assert!(graph.is_recursive(".pkg.B", ".pkg.A"));
    }

    #[test]
    fn non_recursive_messages_report_false() {
        let inner = DescriptorProto {
            name: Some("Inner".to_owned()),
            ..Default::default()
        };
        let outer = DescriptorProto {
            name: Some("Outer".to_owned()),
            field: vec![field("inner", Some(".pkg.Inner"), false)],
            ..Default::default()
        };
        let file = FileDescriptorProto {
            package: Some("pkg".to_owned()),
            message_type: vec![outer, inner],
            ..Default::default()
        };
        let graph = MessageGraph::new(std::iter::once(&file));
        assert!(!graph.is_recursive(".pkg.Outer", ".pkg.Inner"));
    }
}
