//! Generated gRPC types for the `greeter.v1` plugin protocol
tonic::include_proto!("greeter.v1");
