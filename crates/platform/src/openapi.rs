use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use mep_common::api;

use crate::http;

#[derive(OpenApi)]
#[openapi(
    paths(
        http::system::healthz,
        http::system::metrics,
        http::system::openapi_spec,
        http::lifecycle::confirm_ready,
        http::lifecycle::confirm_termination,
        http::lifecycle::token,
        http::lifecycle::configure,
        http::lifecycle::change_state,
        http::lifecycle::terminate,
        http::lifecycle::list_operations,
        http::lifecycle::get_operation,
        http::services::list_app_services,
        http::services::register_service,
        http::services::get_app_service,
        http::services::update_service,
        http::services::deregister_service,
        http::services::discover_services,
        http::services::get_service,
        http::subscriptions::list_subscriptions,
        http::subscriptions::create_subscription,
        http::subscriptions::get_subscription,
        http::subscriptions::delete_subscription,
        http::rules::list_traffic_rules,
        http::rules::get_traffic_rule,
        http::rules::put_traffic_rule,
        http::rules::list_dns_rules,
        http::rules::get_dns_rule,
        http::rules::put_dns_rule,
    ),
    components(schemas(
        api::IndicationType,
        api::OperationActionType,
        api::AppReadyConfirmation,
        api::AppTerminationConfirmation,
        api::ChangeStateTo,
        api::ChangeAppInstanceState,
        api::TerminateAppInstance,
        api::LifecycleOperationType,
        api::OperationStatus,
        api::LcmOperation,
        api::LcmOperationRef,
        api::ServiceState,
        api::SerializerType,
        api::LocalityType,
        api::TransportType,
        api::CategoryRef,
        api::TransportInfo,
        api::LinkType,
        api::ServiceLinks,
        api::SelfLinks,
        api::ServiceInfo,
        api::FilteringCriteria,
        api::SerAvailabilityNotificationSubscription,
        api::AppTerminationNotificationSubscription,
        api::SubscriptionLink,
        api::SubscriptionLinkListLinks,
        api::SubscriptionLinkList,
        api::ServiceChangeType,
        api::ServiceReference,
        api::NotificationLinks,
        api::ServiceAvailabilityNotification,
        api::AppTerminationNotification,
        api::RuleState,
        api::FilterType,
        api::TrafficRuleAction,
        api::TrafficRule,
        api::IpAddressType,
        api::DnsRule,
        api::OAuthCredentials,
        api::ConfigPlatformForApp,
        api::ProblemDetails,
        http::system::Health,
    )),
    tags(
        (name = "system", description = "Health, metrics and the API document"),
        (name = "lifecycle", description = "Instance readiness and termination confirmations"),
        (name = "management", description = "Instance configuration and lifecycle operations"),
        (name = "services", description = "Service registration and discovery"),
        (name = "subscriptions", description = "Availability and termination subscriptions"),
        (name = "rules", description = "Traffic and DNS rule management"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = "Edge Platform Application Enablement API".to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_schemes_from_iter([(
            "platformBearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("opaque")
                    .description(Some(
                        "Bearer platform token for the management surface (header name configurable).",
                    ))
                    .build(),
            ),
        )]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_serializes() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("openapi document serializes");
        assert!(json.contains("/mp1/v1/services"));
        assert!(json.contains("/mepm/v1/app_lcm_op_occs"));
    }
}
