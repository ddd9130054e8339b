//! `protoc-gen-rust`: a standard protoc plugin binary. protoc invokes this, feeding a serialized
//! `CodeGeneratorRequest` on stdin and reading a serialized `CodeGeneratorResponse` back from
//! stdout; everything else about the plugin protocol (temp files, the `--rust_out=` flag syntax)
//! is handled by protoc itself.

use std::io::{self, Read, Write};

use prost::Message;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};

fn main() -> io::Result<()> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;

    let request = CodeGeneratorRequest::decode(&*buf)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid CodeGeneratorRequest: {error}")))?;

    let response: CodeGeneratorResponse = protoforge::generate(request);

    let mut out = Vec::new();
    response
        .encode(&mut out)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, format!("failed to encode CodeGeneratorResponse: {error}")))?;
    io::stdout().write_all(&out)?;

    Ok(())
}
