//! Specialist domains and their lookup tables
//!
//! Every table is an exhaustive `match`, so adding a domain without wiring
//! its agent, destination and prompt is a compile error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A specialist area that owns a tool subset and a system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Erp,
    Crm,
    ItOps,
    Oa,
    Mold,
    General,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Erp,
        Domain::Crm,
        Domain::ItOps,
        Domain::Oa,
        Domain::Mold,
        Domain::General,
    ];

    /// Short tag used in configuration and forced routing
    pub fn tag(self) -> &'static str {
        match self {
            Domain::Erp => "erp",
            Domain::Crm => "crm",
            Domain::ItOps => "it_ops",
            Domain::Oa => "oa",
            Domain::Mold => "mold",
            Domain::General => "general",
        }
    }

    /// Specialist agent that handles this domain
    pub fn agent_name(self) -> &'static str {
        match self {
            Domain::Erp => "erp_agent",
            Domain::Crm => "crm_agent",
            Domain::ItOps => "it_ops_agent",
            Domain::Oa => "oa_agent",
            Domain::Mold => "mold_agent",
            Domain::General => "general_agent",
        }
    }

    /// One-line description shown to the router model
    pub fn summary(self) -> &'static str {
        match self {
            Domain::Erp => "orders, inventory, purchasing, invoices, stock levels",
            Domain::Crm => "customers, leads, opportunities, contacts, follow-ups",
            Domain::ItOps => "servers, deployments, incidents, monitoring, accounts",
            Domain::Oa => "approvals, leave requests, meetings, internal notices",
            Domain::Mold => "mold design, tooling maintenance, cavity and cycle data",
            Domain::General => "small talk and anything outside the other areas",
        }
    }

    /// Role statement placed at the top of the ReAct system prompt
    pub fn system_prompt(self) -> &'static str {
        match self {
            Domain::Erp => "You are the ERP specialist. Answer questions about orders, inventory, purchasing and finance records.",
            Domain::Crm => "You are the CRM specialist. Answer questions about customers, leads and sales pipeline.",
            Domain::ItOps => "You are the IT operations specialist. Answer questions about systems, deployments and incidents.",
            Domain::Oa => "You are the office automation specialist. Answer questions about approvals, scheduling and internal workflows.",
            Domain::Mold => "You are the mold engineering specialist. Answer questions about mold design, tooling and production data.",
            Domain::General => "You are a general assistant for the company.",
        }
    }

    /// Forced-routing table: domain tags only
    pub fn from_tag(tag: &str) -> Option<Domain> {
        let tag = tag.trim().to_ascii_lowercase();
        Domain::ALL.into_iter().find(|d| d.tag() == tag)
    }

    /// Router destination table: agent names, plus bare tags for models that
    /// answer with those
    pub fn from_destination(destination: &str) -> Option<Domain> {
        let destination = destination.trim().to_ascii_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.agent_name() == destination || d.tag() == destination)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
