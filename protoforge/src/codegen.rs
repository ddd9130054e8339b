//! Ties ingestion, template expansion, and stub emission together into the plugin response (spec
//! component G's collaborator): turns a `CodeGeneratorRequest` into a `CodeGeneratorResponse`.

use prost_types::compiler::{code_generator_response, CodeGeneratorRequest, CodeGeneratorResponse};

use crate::bindings::ModelBindings;
use crate::error::Error;
use crate::ingest::ingest;
use crate::stub::emit_stub;
use crate::template::{self, Environment};

const TEMPLATE_NAME: &str = "message.rs.tmpl";
const TEMPLATE: &str = include_str!("templates/message.rs.tmpl");

/// Runs the compiler end to end and reports failure through `CodeGeneratorResponse.error`, per the
/// protoc-plugin protocol's own convention, rather than by returning a `Result` the caller has to
/// translate itself.
pub fn generate(request: CodeGeneratorRequest) -> CodeGeneratorResponse {
    match try_generate(&request) {
        Ok(files) => CodeGeneratorResponse { error: None, supported_features: Some(FEATURE_PROTO3_OPTIONAL), file: files },
        Err(error) => {
            log::error!("codegen failed: {error}");
            CodeGeneratorResponse { error: Some(error.to_string()), supported_features: None, file: Vec::new() }
        }
    }
}

/// `CodeGeneratorResponse.supported_features`'s `FEATURE_PROTO3_OPTIONAL` bit, set so protoc
/// forwards `proto3_optional` fields instead of rejecting the plugin outright.
const FEATURE_PROTO3_OPTIONAL: u64 = 1;

fn try_generate(request: &CodeGeneratorRequest) -> Result<Vec<code_generator_response::File>, Error> {
    let collection = ingest(&request.proto_file)?;

    let bindings = ModelBindings::new(&collection);
    let expanded = template::expand(TEMPLATE_NAME, TEMPLATE, &Environment::new(), &bindings)?;
    let source = format_source(&expanded)?;
    let stub = emit_stub(&collection);

    let base = output_base_name(request);
    Ok(vec![
        code_generator_response::File {
            name: Some(format!("{base}.rs")),
            insertion_point: None,
            content: Some(source),
            generated_code_info: None,
        },
        code_generator_response::File {
            name: Some(format!("{base}.stub")),
            insertion_point: None,
            content: Some(stub),
            generated_code_info: None,
        },
    ])
}

/// Every `.proto` package compiled in one invocation lands as nested `pub mod` blocks inside a
/// single generated file, so there is one source/stub pair per invocation regardless of how many
/// input files were named. The pair is named after the first file protoc asked us to generate.
fn output_base_name(request: &CodeGeneratorRequest) -> String {
    request
        .file_to_generate
        .first()
        .map(|name| name.trim_end_matches(".proto").replace('/', "_"))
        .unwrap_or_else(|| "protoforge_gen".to_string())
}

#[cfg(feature = "format")]
fn format_source(source: &str) -> Result<String, Error> {
    use crate::error::BuildError;

    let file = syn::parse_file(source).map_err(|source| BuildError::Format { module: "generated".to_string(), source })?;
    Ok(prettyplease::unparse(&file))
}

#[cfg(not(feature = "format"))]
fn format_source(source: &str) -> Result<String, Error> {
    Ok(source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_produces_two_empty_modules_worth_of_files() {
        let request = CodeGeneratorRequest::default();
        let response = generate(request);
        assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
        assert_eq!(response.file.len(), 2);
        assert_eq!(response.file[0].name.as_deref(), Some("protoforge_gen.rs"));
        assert_eq!(response.file[1].name.as_deref(), Some("protoforge_gen.stub"));
    }

    #[test]
    fn malformed_input_is_reported_via_response_error_not_panic() {
        let request = CodeGeneratorRequest {
            proto_file: vec![prost_types::FileDescriptorProto {
                name: Some("broken.proto".to_string()),
                syntax: Some("proto2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let response = generate(request);
        assert!(response.error.is_some());
        assert!(response.file.is_empty());
    }
}
