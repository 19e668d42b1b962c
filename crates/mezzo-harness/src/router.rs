//! Scripted SFU router state.
//!
//! Implements the signaling side of the protocol against in-memory tables:
//! id assignment, transport/producer/consumer bookkeeping, and the
//! pause-by-default consumer convention. Every request is appended to a
//! log so tests can assert call counts and ordering. Individual methods
//! can be toggled to reject, for failure-path tests.

use std::collections::{HashMap, HashSet};

use mezzo_proto::{
    ConsumerId, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    MediaKind, Method, ProducerId, RtpCapabilities, RtpCodecCapability, RtpCodecParameters,
    RtpParameters, TransportCreationParams, TransportId, TransportProtocol,
    payloads::{
        ConnectTransportRequest, ConsumeRequest, ConsumeResponse, CreateProducerTransportRequest,
        ProduceRequest, ProduceResponse,
    },
};
use serde_json::{Value, json};

/// Which signaling sequence created a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportSide {
    Producer,
    Consumer,
}

#[derive(Debug)]
struct TransportRecord {
    side: TransportSide,
    connected: bool,
}

#[derive(Debug)]
struct ProducerRecord {
    id: ProducerId,
    kind: MediaKind,
}

#[derive(Debug)]
struct ConsumerRecord {
    resumed: bool,
}

/// One logged request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Requested method.
    pub method: Method,
    /// Raw request payload.
    pub data: Value,
}

/// In-memory SFU signaling state.
#[derive(Debug)]
pub struct SimRouter {
    codecs: Vec<RtpCodecCapability>,
    transports: HashMap<TransportId, TransportRecord>,
    producers: Vec<ProducerRecord>,
    consumers: Vec<(ConsumerId, ConsumerRecord)>,
    rejections: HashSet<Method>,
    log: Vec<RequestRecord>,
    next_transport: u32,
    next_producer: u32,
    next_consumer: u32,
}

impl SimRouter {
    /// Router advertising VP8 video and Opus audio.
    pub fn new() -> Self {
        Self::with_codecs(vec![
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/VP8".to_string(),
                clock_rate: 90_000,
                channels: None,
            },
            RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/opus".to_string(),
                clock_rate: 48_000,
                channels: Some(2),
            },
        ])
    }

    /// Router advertising an explicit codec list.
    pub fn with_codecs(codecs: Vec<RtpCodecCapability>) -> Self {
        Self {
            codecs,
            transports: HashMap::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            rejections: HashSet::new(),
            log: Vec::new(),
            next_transport: 0,
            next_producer: 0,
            next_consumer: 0,
        }
    }

    /// Make `method` fail with a scripted rejection until [`Self::allow`].
    pub fn reject(&mut self, method: Method) {
        self.rejections.insert(method);
    }

    /// Undo a [`Self::reject`].
    pub fn allow(&mut self, method: Method) {
        self.rejections.remove(&method);
    }

    /// Every request seen, in arrival order.
    pub fn log(&self) -> &[RequestRecord] {
        &self.log
    }

    /// How many times `method` was called.
    pub fn calls(&self, method: Method) -> usize {
        self.log.iter().filter(|r| r.method == method).count()
    }

    /// Number of live producers.
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Number of consumers created.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Number of consumers that have been resumed.
    pub fn resumed_count(&self) -> usize {
        self.consumers.iter().filter(|(_, record)| record.resumed).count()
    }

    /// Whether a transport with this id exists and completed its handshake.
    pub fn transport_connected(&self, id: &TransportId) -> bool {
        self.transports.get(id).is_some_and(|t| t.connected)
    }

    /// Handle one request, returning the success payload or the rejection
    /// message that goes back over the wire.
    pub fn handle(&mut self, method: Method, data: &Value) -> Result<Value, String> {
        self.log.push(RequestRecord { method, data: data.clone() });

        if self.rejections.contains(&method) {
            return Err(format!("{method} rejected by test script"));
        }

        match method {
            Method::GetRouterRtpCapabilities => Ok(encode(&RtpCapabilities {
                codecs: self.codecs.clone(),
                header_extensions: vec![],
            })),
            Method::CreateProducerTransport => self.create_transport(TransportSide::Producer, data),
            Method::CreateConsumerTransport => self.create_transport(TransportSide::Consumer, data),
            Method::ConnectProducerTransport => self.connect_transport(TransportSide::Producer, data),
            Method::ConnectConsumerTransport => self.connect_transport(TransportSide::Consumer, data),
            Method::Produce => self.produce(data),
            Method::Consume => self.consume(data),
            Method::Resume => self.resume(),
        }
    }

    fn create_transport(&mut self, side: TransportSide, data: &Value) -> Result<Value, String> {
        if side == TransportSide::Producer {
            let request: CreateProducerTransportRequest = decode(data)?;
            if request.rtp_capabilities.codecs.is_empty() {
                return Err("empty rtpCapabilities".to_string());
            }
        }

        self.next_transport += 1;
        let id = TransportId::new(format!("t{}", self.next_transport));
        self.transports.insert(id.clone(), TransportRecord { side, connected: false });

        Ok(encode(&TransportCreationParams {
            id,
            ice_parameters: IceParameters {
                username_fragment: "sim-ufrag".to_string(),
                password: "sim-pwd".to_string(),
            },
            ice_candidates: vec![IceCandidate {
                foundation: "udpcandidate".to_string(),
                priority: 1_076_302_079,
                address: "127.0.0.1".to_string(),
                port: 40_000 + u16::try_from(self.next_transport).unwrap_or(0),
                protocol: TransportProtocol::Udp,
            }],
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![DtlsFingerprint {
                    algorithm: "sha-256".to_string(),
                    value: "00:11:22:33".to_string(),
                }],
            },
        }))
    }

    fn connect_transport(&mut self, side: TransportSide, data: &Value) -> Result<Value, String> {
        let request: ConnectTransportRequest = decode(data)?;

        let record = self
            .transports
            .get_mut(&request.transport_id)
            .ok_or_else(|| format!("unknown transport {}", request.transport_id))?;
        if record.side != side {
            return Err(format!("transport {} has the wrong direction", request.transport_id));
        }
        if record.connected {
            return Err(format!("transport {} already connected", request.transport_id));
        }
        if request.dtls_parameters.fingerprints.is_empty() {
            return Err("missing DTLS fingerprints".to_string());
        }

        record.connected = true;
        Ok(json!({}))
    }

    fn produce(&mut self, data: &Value) -> Result<Value, String> {
        let request: ProduceRequest = decode(data)?;

        let record = self
            .transports
            .get(&request.transport_id)
            .ok_or_else(|| format!("unknown transport {}", request.transport_id))?;
        if record.side != TransportSide::Producer {
            return Err("produce on a consumer transport".to_string());
        }
        if !record.connected {
            return Err(format!("transport {} not connected", request.transport_id));
        }
        if request.rtp_parameters.codecs.is_empty() {
            return Err("produce without codecs".to_string());
        }

        self.next_producer += 1;
        let id = ProducerId::new(format!("p{}", self.next_producer));
        self.producers.push(ProducerRecord { id: id.clone(), kind: request.kind });

        Ok(encode(&ProduceResponse { id }))
    }

    fn consume(&mut self, data: &Value) -> Result<Value, String> {
        let request: ConsumeRequest = decode(data)?;

        let producer = self.producers.last().ok_or_else(|| "no producer to consume".to_string())?;

        let codec = self
            .codecs
            .iter()
            .filter(|c| c.kind == producer.kind)
            .find(|c| {
                request
                    .rtp_capabilities
                    .codecs
                    .iter()
                    .any(|r| r.mime_type.eq_ignore_ascii_case(&c.mime_type))
            })
            .ok_or_else(|| "incompatible rtpCapabilities".to_string())?;

        self.next_consumer += 1;
        let id = ConsumerId::new(format!("c{}", self.next_consumer));
        self.consumers.push((id.clone(), ConsumerRecord { resumed: false }));

        Ok(encode(&ConsumeResponse {
            producer_id: producer.id.clone(),
            id,
            kind: producer.kind,
            rtp_parameters: RtpParameters {
                mid: None,
                codecs: vec![RtpCodecParameters {
                    mime_type: codec.mime_type.clone(),
                    payload_type: 96,
                    clock_rate: codec.clock_rate,
                    channels: codec.channels,
                }],
                encodings: vec![],
            },
        }))
    }

    fn resume(&mut self) -> Result<Value, String> {
        let (_, record) = self
            .consumers
            .iter_mut()
            .rev()
            .find(|(_, record)| !record.resumed)
            .ok_or_else(|| "no paused consumer".to_string())?;

        record.resumed = true;
        Ok(json!({}))
    }
}

impl Default for SimRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn decode<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T, String> {
    serde_json::from_value(data.clone()).map_err(|e| format!("malformed payload: {e}"))
}
