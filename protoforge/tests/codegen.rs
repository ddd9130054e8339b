//! End-to-end coverage of the protoc-plugin entry point: a hand-built `FileDescriptorProto` goes
//! in, a `CodeGeneratorResponse` carrying generated source and a stub comes out.

use prost_types::compiler::CodeGeneratorRequest;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

fn greeting_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("greet.proto".to_owned()),
        package: Some("greet".to_owned()),
        syntax: Some("proto3".to_owned()),
        message_type: vec![DescriptorProto {
            name: Some("Greeting".to_owned()),
            field: vec![
                FieldDescriptorProto {
                    name: Some("text".to_owned()),
                    number: Some(1),
                    r#type: Some(Type::String as i32),
                    label: Some(Label::Optional as i32),
                    ..Default::default()
                },
                FieldDescriptorProto {
                    name: Some("volume".to_owned()),
                    number: Some(2),
                    r#type: Some(Type::Int32 as i32),
                    label: Some(Label::Repeated as i32),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn compiles_a_simple_message_into_source_and_stub() {
    let request = CodeGeneratorRequest {
        file_to_generate: vec!["greet.proto".to_owned()],
        proto_file: vec![greeting_file()],
        ..Default::default()
    };

    let response = protoforge::generate(request);

    assert!(response.error.is_none(), "unexpected codegen error: {:?}", response.error);
    assert_eq!(response.file.len(), 2);

    let source = response.file[0].content.as_deref().expect("source file has content");
    assert_eq!(response.file[0].name.as_deref(), Some("greet.rs"));
    assert!(source.contains("pub mod greet"));
    assert!(source.contains("pub struct Greeting"));
    assert!(source.contains("impl protoforge_runtime::Message for Greeting"));

    let stub = response.file[1].content.as_deref().expect("stub file has content");
    assert_eq!(response.file[1].name.as_deref(), Some("greet.stub"));
    assert!(stub.contains("pub mod greet {"));
    assert!(stub.contains("pub struct Greeting {"));
}

#[test]
fn unsupported_syntax_is_reported_as_a_response_error() {
    let mut file = greeting_file();
    file.syntax = Some("proto2".to_owned());
    let request = CodeGeneratorRequest {
        file_to_generate: vec!["greet.proto".to_owned()],
        proto_file: vec![file],
        ..Default::default()
    };

    let response = protoforge::generate(request);

    assert!(response.file.is_empty());
    let error = response.error.expect("proto2 input should be rejected");
    assert!(error.contains("proto3"), "unexpected error message: {error}");
}
