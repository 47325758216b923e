// Dataplane rule-service messages and client (cpif.dataplane.RuleService)
// Note: Messages and the client are written by hand to match proto/dataplane.proto.
// TODO: Generate with tonic-build once protoc is available in the build image.

use tonic::codegen::*;

/// Error code the dataplane returns on success
pub const CODE_OK: i32 = 0;

// ========================================
// Messages
// ========================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SourceInterface {
    Access = 0,
    Core = 1,
}

/// PDR add/delete request; deletes only use the match fields
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PdrRequest {
    #[prost(string, tag = "1")]
    pub module: ::prost::alloc::string::String,
    #[prost(enumeration = "SourceInterface", tag = "2")]
    pub src_iface: i32,
    #[prost(uint32, tag = "3")]
    pub src_addr: u32,
    #[prost(uint32, tag = "4")]
    pub src_mask: u32,
    #[prost(uint32, tag = "5")]
    pub dst_addr: u32,
    #[prost(uint32, tag = "6")]
    pub dst_mask: u32,
    #[prost(uint32, tag = "7")]
    pub fseid: u32,
    #[prost(uint32, tag = "8")]
    pub ctr_id: u32,
    #[prost(uint32, tag = "9")]
    pub far_id: u32,
    #[prost(bool, tag = "10")]
    pub need_decap: bool,
}

/// FAR add/delete request; deletes only use far_id and fseid
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FarRequest {
    #[prost(string, tag = "1")]
    pub module: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub far_id: u32,
    #[prost(uint32, tag = "3")]
    pub fseid: u32,
    #[prost(bool, tag = "4")]
    pub tunnel: bool,
    #[prost(uint32, tag = "5")]
    pub tun_src: u32,
    #[prost(uint32, tag = "6")]
    pub tun_dst: u32,
    #[prost(uint32, tag = "7")]
    pub teid: u32,
    #[prost(uint32, tag = "8")]
    pub tun_port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CounterRequest {
    #[prost(string, tag = "1")]
    pub module: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub ctr_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveAllRequest {
    #[prost(string, tag = "1")]
    pub module: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

impl CommandResponse {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

// ========================================
// Client
// ========================================

const SERVICE_NAME: &str = "cpif.dataplane.RuleService";

#[derive(Debug, Clone)]
pub struct RuleServiceClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl<T> RuleServiceClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    pub fn new(inner: T) -> Self {
        let inner = tonic::client::Grpc::new(inner);
        Self { inner }
    }

    async fn unary<M>(
        &mut self,
        request: tonic::Request<M>,
        method: &'static str,
        path: &'static str,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status>
    where
        M: ::prost::Message + Send + Sync + 'static,
    {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {}", e.into()),
            )
        })?;
        let codec = tonic::codec::ProstCodec::<M, CommandResponse>::default();
        let path = http::uri::PathAndQuery::from_static(path);
        let mut req = request;
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, method));
        self.inner.unary(req, path, codec).await
    }

    pub async fn add_pdr(
        &mut self,
        request: impl tonic::IntoRequest<PdrRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "AddPdr",
            "/cpif.dataplane.RuleService/AddPdr",
        )
        .await
    }

    pub async fn del_pdr(
        &mut self,
        request: impl tonic::IntoRequest<PdrRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "DelPdr",
            "/cpif.dataplane.RuleService/DelPdr",
        )
        .await
    }

    pub async fn add_far(
        &mut self,
        request: impl tonic::IntoRequest<FarRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "AddFar",
            "/cpif.dataplane.RuleService/AddFar",
        )
        .await
    }

    pub async fn del_far(
        &mut self,
        request: impl tonic::IntoRequest<FarRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "DelFar",
            "/cpif.dataplane.RuleService/DelFar",
        )
        .await
    }

    pub async fn add_counter(
        &mut self,
        request: impl tonic::IntoRequest<CounterRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "AddCounter",
            "/cpif.dataplane.RuleService/AddCounter",
        )
        .await
    }

    pub async fn del_counter(
        &mut self,
        request: impl tonic::IntoRequest<CounterRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "DelCounter",
            "/cpif.dataplane.RuleService/DelCounter",
        )
        .await
    }

    pub async fn remove_all(
        &mut self,
        request: impl tonic::IntoRequest<RemoveAllRequest>,
    ) -> std::result::Result<tonic::Response<CommandResponse>, tonic::Status> {
        self.unary(
            request.into_request(),
            "RemoveAll",
            "/cpif.dataplane.RuleService/RemoveAll",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_pdr_request_wire_format() {
        let req = PdrRequest {
            module: "pdrLookup".to_string(),
            src_iface: SourceInterface::Core as i32,
            src_addr: 0x1000_0001,
            src_mask: 0xffff_ffff,
            fseid: 0xbeef,
            ctr_id: 3,
            far_id: 1,
            ..Default::default()
        };

        let bytes = req.encode_to_vec();
        let decoded = PdrRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(decoded.src_iface(), SourceInterface::Core);
        assert!(!decoded.need_decap);
    }

    #[test]
    fn test_command_response_ok() {
        assert!(CommandResponse::default().is_ok());
        let failed = CommandResponse {
            code: 2,
            message: "no such module".to_string(),
        };
        assert!(!failed.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_status_error() {
        let channel = tonic::transport::Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        let mut client = RuleServiceClient::new(channel);

        let result = client
            .remove_all(RemoveAllRequest {
                module: "gtpuEncap".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}
