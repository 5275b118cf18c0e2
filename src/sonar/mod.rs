//! SonarQube integration.
//!
//! - [`client`]: bearer-authenticated GET client and the [`QualityGateApi`] seam
//! - [`token`]: access-token resolution chain
//! - [`types`]: response shapes

pub mod client;
pub mod token;
pub mod types;

pub use client::{format_error, QualityGateApi, SonarClient};
pub use token::{
    resolve_token, BasicCredentials, HttpTokenAuthority, ResolvedToken, TokenAuthority,
    TokenResolver, TokenSource, TokenSources,
};
pub use types::{
    Impact, Issue, IssuesSearchResponse, QualityGateCondition, QualityGateProjectStatus,
    QualityGateStatus, Rule, RulesSearchResponse,
};
