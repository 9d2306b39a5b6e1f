#![forbid(unsafe_code)]

//! SAML protocol (SAMLP) messages for SAML 1.1 and 2.0.
//!
//! Builders serialize `AttributeQuery`, `AuthnRequest` and `Response`
//! messages from configuration and policy context variables. Evaluators
//! check inbound queries, authentication requests and responses, publish
//! their fields as `<prefix>.<suffix>` context variables and report an
//! [`Evaluation`].

pub mod attribute_query;
pub mod authn_request;
pub mod binding;
pub mod context;
pub mod encrypted_id;
pub mod evaluator;
mod message;
pub mod name_id;
pub mod request;
pub mod response;
pub mod signing;
pub mod status;
pub mod time;
pub mod vars;
pub mod version;

pub use attribute_query::{AttributeQueryEvaluator, AttributeQueryEvaluatorConfig};
pub use authn_request::{AuthnRequestBinding, AuthnRequestEvaluator, AuthnRequestEvaluatorConfig};
pub use context::{ContextValue, HttpFacts, PolicyContext, SimplePolicyContext};
pub use evaluator::{ExpectedAttribute, ResponseEvaluator, ResponseEvaluatorConfig};
pub use name_id::NameId;
pub use request::{
    NameIdPolicy, OutputBinding, QueryAttribute, RecipientCertificate, RequestBuilder,
    RequestBuilderConfig, RequestKind,
};
pub use response::{ResponseBuilder, ResponseBuilderConfig};
pub use signing::SigningCredential;
pub use status::{AssertionStatus, Evaluation, SamlStatus};
pub use version::SamlVersion;
