//! TelemetryX gRPC 协议定义
//!
//! 由 `proto/` 目录下的 protobuf 文件在构建期生成。
//! 所有消息与服务都位于 `telemetryx` 包中。

pub mod telemetryx {
    tonic::include_proto!("telemetryx");
}

pub use telemetryx::*;

/// 编码后的文件描述符集合，供 gRPC 反射服务使用
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("telemetryx_descriptor");
