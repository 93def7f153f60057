fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the greeter plugin protocol
    tonic_prost_build::compile_protos("proto/greeter.proto")?;

    Ok(())
}
