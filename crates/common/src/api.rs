//! Wire DTOs shared across the MEC platform APIs.
//!
//! Field names follow the camelCase wire convention used by the Mp1 and
//! management surfaces; lifecycle and service enums serialize to their
//! upper-case wire tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of an application instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicationType {
    /// Instance configured, waiting for its readiness confirmation.
    Starting,
    /// Instance confirmed ready; services may be registered.
    Ready,
    /// Instance is being stopped.
    Stopping,
    /// Instance is being terminated.
    Terminating,
}

impl IndicationType {
    /// Returns the canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicationType::Starting => "STARTING",
            IndicationType::Ready => "READY",
            IndicationType::Stopping => "STOPPING",
            IndicationType::Terminating => "TERMINATING",
        }
    }
}

/// Termination action requested by the platform and acknowledged by the app.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationActionType {
    /// Stop the instance.
    Stopping,
    /// Terminate the instance.
    Terminating,
}

impl OperationActionType {
    /// Returns the canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationActionType::Stopping => "STOPPING",
            OperationActionType::Terminating => "TERMINATING",
        }
    }

    /// The lifecycle indication an instance enters when this action is requested.
    pub fn indication(&self) -> IndicationType {
        match self {
            OperationActionType::Stopping => IndicationType::Stopping,
            OperationActionType::Terminating => IndicationType::Terminating,
        }
    }
}

/// Readiness confirmation body posted by an application instance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppReadyConfirmation {
    /// Must be `READY`.
    pub indication: IndicationType,
}

/// Termination acknowledgement body posted by an application instance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppTerminationConfirmation {
    /// The action the instance believes it is acknowledging.
    pub operation_action: OperationActionType,
}

/// Target operational state for a platform-initiated state change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStateTo {
    /// Run the instance.
    Started,
    /// Stop the instance.
    Stopped,
}

/// Management request moving an instance toward STARTED or STOPPED.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAppInstanceState {
    /// Requested operational state.
    pub change_state_to: ChangeStateTo,
    /// Seconds the instance is granted before destructive cleanup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_stop_timeout: Option<u32>,
}

/// Management request terminating or stopping an instance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminateAppInstance {
    /// Whether the instance is stopped or fully terminated.
    pub termination_type: OperationActionType,
    /// Seconds the instance is granted before destructive cleanup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_stop_timeout: Option<u32>,
}

/// Lifecycle operation kind recorded for audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleOperationType {
    /// Instance configuration/startup.
    Starting,
    /// Platform-initiated stop.
    Stopping,
    /// Platform-initiated termination.
    Terminating,
}

/// Status of a lifecycle operation occurrence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Operation accepted, side effects still in flight.
    Processing,
    /// Operation completed.
    SuccessfullyDone,
    /// Operation failed.
    Failed,
}

/// Audit record for one lifecycle request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LcmOperation {
    /// Unique occurrence identifier.
    pub lifecycle_operation_occurrence_id: Uuid,
    /// Instance the operation applies to.
    pub app_instance_id: String,
    /// Operation kind.
    pub operation: LifecycleOperationType,
    /// Current status.
    pub operation_status: OperationStatus,
    /// When the current status was entered.
    pub state_entered_time: DateTime<Utc>,
}

/// Response body carrying a freshly created lifecycle operation occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LcmOperationRef {
    /// Identifier of the recorded operation.
    pub lifecycle_operation_occurrence_id: Uuid,
}

/// Availability state of a registered service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    /// Service is usable.
    Active,
    /// Service is registered but not usable.
    Inactive,
    /// Service is temporarily suspended.
    Suspended,
}

impl ServiceState {
    /// Returns the canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Active => "ACTIVE",
            ServiceState::Inactive => "INACTIVE",
            ServiceState::Suspended => "SUSPENDED",
        }
    }
}

/// Serializer offered by a service endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerializerType {
    /// JSON payloads.
    Json,
    /// XML payloads.
    Xml,
    /// Protocol Buffers v3 payloads.
    Proto3,
}

/// Scope within which a service is consumable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalityType {
    /// Whole MEC system.
    MecSystem,
    /// Single MEC host.
    MecHost,
    /// NFVI point of presence.
    NfviPop,
    /// Availability zone.
    Zone,
    /// Group of zones.
    ZoneGroup,
    /// Single NFVI node.
    NfviNode,
}

impl LocalityType {
    /// Returns the canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalityType::MecSystem => "MEC_SYSTEM",
            LocalityType::MecHost => "MEC_HOST",
            LocalityType::NfviPop => "NFVI_POP",
            LocalityType::Zone => "ZONE",
            LocalityType::ZoneGroup => "ZONE_GROUP",
            LocalityType::NfviNode => "NFVI_NODE",
        }
    }
}

/// Transport offered by a service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    /// RESTful HTTP API.
    RestHttp,
    /// Topic-based message bus.
    MbTopicBased,
    /// Routing message bus.
    MbRouting,
    /// Publish/subscribe message bus.
    MbPubsub,
    /// Remote procedure call.
    Rpc,
    /// Streaming RPC.
    RpcStreaming,
    /// WebSocket.
    Websocket,
}

/// Reference to a service category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CategoryRef {
    /// Link to the category resource.
    pub href: String,
    /// Category identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Category version.
    pub version: String,
}

/// Transport descriptor attached to a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    /// Transport identifier.
    pub id: String,
    /// Transport name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Transport kind.
    #[serde(rename = "type")]
    pub transport_type: TransportType,
    /// Protocol name, e.g. `HTTP`.
    pub protocol: String,
    /// Protocol version.
    pub version: String,
    /// Endpoint description (addresses, URIs, or alternative form).
    pub endpoint: Value,
    /// Security descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Value>,
    /// Implementation-specific details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impl_specific_info: Option<Value>,
}

/// A single hyperlink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LinkType {
    /// Target URI.
    pub href: String,
}

impl LinkType {
    /// Convenience constructor.
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// Links attached to a service, currently only the liveness endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct ServiceLinks {
    /// Liveness endpoint the platform probes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LinkType>,
}

/// Self-referencing links on a subscription or notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SelfLinks {
    /// The resource itself.
    #[serde(rename = "self")]
    pub self_link: LinkType,
}

/// A registered MEC service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Unique service instance identifier; generated when absent on creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ser_instance_id: Option<String>,
    /// Service name, unique per owning application.
    pub ser_name: String,
    /// Optional category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ser_category: Option<CategoryRef>,
    /// Service version.
    pub version: String,
    /// Availability state.
    pub state: ServiceState,
    /// Transport descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_info: Option<TransportInfo>,
    /// Payload serializer.
    pub serializer: SerializerType,
    /// Consumability scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_of_locality: Option<LocalityType>,
    /// Whether only local consumers may use the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_local_only: Option<bool>,
    /// Whether the service runs on this host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    /// Liveness probe interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_interval: Option<u32>,
    /// Service links.
    #[serde(rename = "_links", skip_serializing_if = "Option::is_none")]
    pub links: Option<ServiceLinks>,
}

/// Subscription-side predicate restricting which service events are delivered.
///
/// `ser_instance_ids`, `ser_names`, and `ser_categories` are mutually
/// exclusive; an unset criterion matches any value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilteringCriteria {
    /// Restrict to these service instance ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ser_instance_ids: Option<Vec<String>>,
    /// Restrict to these service names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ser_names: Option<Vec<String>>,
    /// Restrict to these categories (matched by category id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ser_categories: Option<Vec<CategoryRef>>,
    /// Restrict to these availability states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<ServiceState>>,
    /// Restrict to local/non-local services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
}

/// Subscription to service-availability notifications.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SerAvailabilityNotificationSubscription {
    /// Always `SerAvailabilityNotificationSubscription`.
    pub subscription_type: String,
    /// URI the platform POSTs notifications to.
    pub callback_reference: String,
    /// Self link, generated by the platform when absent.
    #[serde(rename = "_links", skip_serializing_if = "Option::is_none")]
    pub links: Option<SelfLinks>,
    /// Optional event filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtering_criteria: Option<FilteringCriteria>,
}

/// Subscription to application-termination notifications.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppTerminationNotificationSubscription {
    /// Always `AppTerminationNotificationSubscription`.
    pub subscription_type: String,
    /// URI the platform POSTs the termination notice to.
    pub callback_reference: String,
    /// Self link, generated by the platform when absent.
    #[serde(rename = "_links", skip_serializing_if = "Option::is_none")]
    pub links: Option<SelfLinks>,
    /// Instance whose termination is being watched.
    pub app_instance_id: String,
}

/// One entry in a subscription link list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionLink {
    /// Link to the subscription resource.
    pub href: String,
    /// Subscription kind.
    pub rel: String,
}

/// Links object of a subscription link list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionLinkListLinks {
    /// The list resource itself.
    #[serde(rename = "self")]
    pub self_link: LinkType,
    /// The individual subscriptions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<SubscriptionLink>,
}

/// Response listing a requestor's subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionLinkList {
    /// Link container.
    #[serde(rename = "_links")]
    pub links: SubscriptionLinkListLinks,
}

/// Kind of change that triggered a service-availability notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceChangeType {
    /// Service newly registered.
    Added,
    /// Service removed.
    Removed,
    /// Only the availability state changed.
    StateChanged,
    /// Any other attribute changed.
    AttributesChanged,
}

/// Reference to a changed service inside an availability notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    /// Link to the service resource.
    pub link: LinkType,
    /// Service name.
    pub ser_name: String,
    /// Service instance id.
    pub ser_instance_id: String,
    /// Availability state after the change.
    pub state: ServiceState,
    /// What changed.
    pub change_type: ServiceChangeType,
}

/// Links object of a notification, pointing back at the subscription.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationLinks {
    /// Subscription that caused this notification.
    pub subscription: LinkType,
}

/// Service-availability notification delivered to a subscriber callback.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAvailabilityNotification {
    /// Always `SerAvailabilityNotification`.
    pub notification_type: String,
    /// Changed services.
    pub service_references: Vec<ServiceReference>,
    /// Link container.
    #[serde(rename = "_links")]
    pub links: NotificationLinks,
}

/// Termination notification delivered to a subscriber callback.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppTerminationNotification {
    /// Always `AppTerminationNotification`.
    pub notification_type: String,
    /// Action being applied to the instance.
    pub operation_action: OperationActionType,
    /// Seconds granted before destructive cleanup.
    pub max_graceful_timeout: u32,
    /// Link container.
    #[serde(rename = "_links")]
    pub links: NotificationLinks,
}

/// Activation state of a traffic or DNS rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleState {
    /// Rule is applied.
    Active,
    /// Rule is stored but not applied.
    Inactive,
}

impl RuleState {
    /// Returns the canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleState::Active => "ACTIVE",
            RuleState::Inactive => "INACTIVE",
        }
    }
}

/// Granularity of a traffic filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterType {
    /// Per-flow filtering.
    Flow,
    /// Per-packet filtering.
    Packet,
}

/// Action applied to traffic matching a rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficRuleAction {
    /// Drop matching traffic.
    Drop,
    /// Forward after decapsulation.
    ForwardDecapsulated,
    /// Forward keeping encapsulation.
    ForwardAsIs,
    /// Pass traffic through unchanged.
    Passthrough,
    /// Duplicate after decapsulation.
    DuplicateDecapsulated,
    /// Duplicate keeping encapsulation.
    DuplicateAsIs,
}

/// Traffic redirection rule owned by an application instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRule {
    /// Rule identifier, unique per owning instance.
    pub traffic_rule_id: String,
    /// Filter granularity.
    pub filter_type: FilterType,
    /// Priority; higher value wins.
    pub priority: u32,
    /// Filter clauses (addresses, ports, protocols).
    pub traffic_filter: Vec<Value>,
    /// Action on match.
    pub action: TrafficRuleAction,
    /// Destination interface for forwarding actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_interface: Option<Value>,
    /// Activation state.
    pub state: RuleState,
}

/// Address family of a DNS rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpAddressType {
    /// IPv4 record.
    IpV4,
    /// IPv6 record.
    IpV6,
}

/// DNS rule owned by an application instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsRule {
    /// Rule identifier, unique per owning instance.
    pub dns_rule_id: String,
    /// Domain the rule resolves.
    pub domain_name: String,
    /// Address family.
    pub ip_address_type: IpAddressType,
    /// Address the domain resolves to.
    pub ip_address: String,
    /// Record time-to-live in seconds.
    pub ttl: u32,
    /// Activation state; ACTIVE rules exist in the external DNS service.
    pub state: RuleState,
}

/// OAuth credential bundle issued to an instance at configuration time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OAuthCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Access token for platform services.
    pub access_token: String,
}

/// Management request configuring the platform for a new instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPlatformForApp {
    /// Traffic rules to provision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_traffic_rule: Vec<TrafficRule>,
    /// DNS rules to provision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_dns_rule: Vec<DnsRule>,
}

/// Problem-details error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProblemDetails {
    /// Problem type URI or token.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    /// Short human-readable summary.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Explanation specific to this occurrence.
    pub detail: String,
}
