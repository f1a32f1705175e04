//! Built-in Wazuh Manager tools

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::rest::{Param, ParamKind, RestTool};
use super::{Content, ToolContext, ToolDefinition, ToolHandler, ToolMetadata, ToolRegistry};
use crate::{Error, Result};

/// Agent connection states understood by `/agents`
pub const AGENT_STATUSES: &[&str] = &["active", "pending", "never_connected", "disconnected"];

/// Register every built-in tool.
///
/// Fails on the first duplicate name.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(authenticate_tool())?;
    for tool in rest_tools() {
        registry.register(tool.into_definition())?;
    }
    Ok(())
}

// ── AuthenticateTool ──

struct Authenticate;

#[async_trait]
impl ToolHandler for Authenticate {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Vec<Content>> {
        let cluster = args
            .get("cluster")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("'cluster' is required".into()))?;

        let token = ctx.auth.force_refresh(cluster).await?;
        Ok(vec![Content::text(format!(
            "New token acquired for cluster '{cluster}'. Valid until {}.",
            token.expires_at.to_rfc3339()
        ))])
    }
}

fn authenticate_tool() -> ToolDefinition {
    ToolDefinition {
        name: "AuthenticateTool".into(),
        description: "Force a new JWT token acquisition from the Wazuh Manager of a cluster."
            .into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "cluster": {
                    "type": "string",
                    "description": "Name of the configured Wazuh cluster to authenticate against"
                }
            },
            "required": ["cluster"]
        }),
        metadata: ToolMetadata {
            category: "security".into(),
            http_method: None,
        },
        handler: Arc::new(Authenticate),
    }
}

// ── REST tools ──

fn paging() -> [Param; 2] {
    [
        Param::query("limit", ParamKind::Integer, "Maximum number of items to return")
            .default(json!(500))
            .minimum(1),
        Param::query("offset", ParamKind::Integer, "First item to return")
            .default(json!(0))
            .minimum(0),
    ]
}

fn common_filters() -> [Param; 5] {
    [
        Param::query("sort", ParamKind::String, "Sort results by field(s), e.g. '+name'"),
        Param::query("search", ParamKind::String, "Only items containing this string"),
        Param::query("select", ParamKind::StringList, "Fields to return"),
        Param::query("q", ParamKind::String, "Wazuh query expression, e.g. 'os.platform=ubuntu'"),
        Param::query("distinct", ParamKind::Boolean, "Only distinct values"),
    ]
}

fn agent_id() -> Param {
    Param::path("agent_id", "Agent ID, e.g. '001'")
}

fn string_filters(names: &[&'static str], what: &'static str) -> Vec<Param> {
    names
        .iter()
        .map(|&name| Param::query(name, ParamKind::String, what))
        .collect()
}

fn rest_tools() -> Vec<RestTool> {
    vec![
        RestTool::new(
            "GetAgentsTool",
            "List agents registered in the manager, optionally filtered by connection status.",
            "agents",
            Method::GET,
            "/agents",
        )
        .params([Param::query("status", ParamKind::StringList, "Only agents in these states")
            .one_of(AGENT_STATUSES)])
        .params(paging())
        .params(common_filters())
        .shaper(enforce_agent_filters),
        RestTool::new(
            "GetAgentTool",
            "Get one agent by ID.",
            "agents",
            Method::GET,
            "/agents",
        )
        .params([Param::query("agent_id", ParamKind::String, "Agent ID, e.g. '001'")
            .key("agents_list")
            .required()]),
        RestTool::new(
            "GetAgentPortsTool",
            "List open network ports of an agent from syscollector.",
            "syscollector",
            Method::GET,
            "/syscollector/{agent_id}/ports",
        )
        .params([agent_id()])
        .params(paging())
        .params([
            Param::query("protocol", ParamKind::String, "Filter by protocol (tcp, udp)"),
            Param::query("local_ip", ParamKind::String, "Filter by local IP address").key("local.ip"),
            Param::query("local_port", ParamKind::String, "Filter by local port").key("local.port"),
            Param::query("remote_ip", ParamKind::String, "Filter by remote IP address").key("remote.ip"),
            Param::query("state", ParamKind::String, "Filter by state (listening, established, ...)"),
            Param::query("process", ParamKind::String, "Filter by process name"),
            Param::query("pid", ParamKind::String, "Filter by process ID"),
            Param::query("tx_queue", ParamKind::String, "Filter by tx_queue"),
        ])
        .params(common_filters()),
        RestTool::new(
            "GetAgentPackagesTool",
            "List installed packages of an agent from syscollector.",
            "syscollector",
            Method::GET,
            "/syscollector/{agent_id}/packages",
        )
        .params([agent_id()])
        .params(paging())
        .params(string_filters(
            &["vendor", "name", "architecture", "format", "version"],
            "Filter by this package attribute",
        ))
        .params(common_filters()),
        RestTool::new(
            "GetAgentProcessesTool",
            "List running processes of an agent from syscollector.",
            "syscollector",
            Method::GET,
            "/syscollector/{agent_id}/processes",
        )
        .params([agent_id()])
        .params(paging())
        .params(string_filters(
            &[
                "pid", "state", "ppid", "egroup", "euser", "fgroup", "name", "nlwp", "pgrp",
                "priority", "rgroup", "ruser", "sgroup", "suser",
            ],
            "Filter by this process attribute",
        ))
        .params(common_filters()),
        RestTool::new(
            "ListRulesTool",
            "List detection rules, optionally filtered by ID, group, level or compliance mapping.",
            "rules",
            Method::GET,
            "/rules",
        )
        .params([Param::query("rule_ids", ParamKind::IntegerList, "Only these rule IDs")])
        .params(paging())
        .params([
            Param::query("status", ParamKind::String, "Rule status")
                .one_of(&["enabled", "disabled", "all"]),
            Param::query("group", ParamKind::String, "Filter by rule group"),
            Param::query("level", ParamKind::String, "Rule level, e.g. '4' or '2-4'"),
            Param::query("filename", ParamKind::StringList, "Filter by rule file name"),
            Param::query("relative_dirname", ParamKind::String, "Filter by relative directory"),
            Param::query("pci_dss", ParamKind::String, "Filter by PCI DSS requirement"),
            Param::query("gdpr", ParamKind::String, "Filter by GDPR requirement"),
            Param::query("gpg13", ParamKind::String, "Filter by GPG13 requirement"),
            Param::query("hipaa", ParamKind::String, "Filter by HIPAA requirement"),
            Param::query("nist_800_53", ParamKind::String, "Filter by NIST-800-53 requirement")
                .key("nist-800-53"),
            Param::query("tsc", ParamKind::String, "Filter by TSC requirement"),
            Param::query("mitre", ParamKind::String, "Filter by MITRE technique ID"),
        ])
        .params(common_filters()),
        RestTool::new(
            "GetRuleFileContentTool",
            "Get the content of a rule file, as parsed JSON or raw XML.",
            "rules",
            Method::GET,
            "/rules/files/{filename}",
        )
        .params([
            Param::path("filename", "Rule file name, e.g. '0010-rules_config.xml'"),
            Param::query("raw", ParamKind::Boolean, "Return the file as plain text")
                .default(json!(false)),
            Param::query("relative_dirname", ParamKind::String, "Filter by relative directory"),
        ])
        .raw_flag("raw"),
        RestTool::new(
            "GetAgentScaTool",
            "Security Configuration Assessment policy results for an agent.",
            "sca",
            Method::GET,
            "/sca/{agent_id}",
        )
        .params([agent_id()])
        .params(paging())
        .params(string_filters(
            &["name", "description", "references"],
            "Filter by this policy attribute",
        ))
        .params(common_filters()),
        RestTool::new(
            "GetScaPolicyChecksTool",
            "Checks of one SCA policy on an agent, with results and remediation.",
            "sca",
            Method::GET,
            "/sca/{agent_id}/checks/{policy_id}",
        )
        .params([agent_id(), Param::path("policy_id", "SCA policy ID, e.g. 'cis_ubuntu22-04'")])
        .params(paging())
        .params(string_filters(
            &[
                "title", "description", "rationale", "remediation", "command", "reason", "file",
                "process", "directory", "registry", "references", "result", "condition",
            ],
            "Filter by this check attribute",
        ))
        .params(common_filters()),
    ]
}

/// Keep only agents in the requested states, at most `limit` of them.
///
/// The manager honours both parameters itself; this guards against
/// deployments that ignore them. When the status filter drops agents,
/// `total_affected_items` is rewritten to the number that matched, so it
/// keeps describing the filtered set of which `affected_items` is one page.
fn enforce_agent_filters(args: &Map<String, Value>, mut body: Value) -> Value {
    let statuses: Option<HashSet<&str>> = args
        .get("status")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .filter(|set: &HashSet<&str>| !set.is_empty());
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .and_then(|l| usize::try_from(l).ok());

    let Some(items) = body
        .pointer_mut("/data/affected_items")
        .and_then(Value::as_array_mut)
    else {
        return body;
    };

    let received = items.len();
    if let Some(statuses) = &statuses {
        items.retain(|agent| {
            agent
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| statuses.contains(s))
        });
    }
    let matched = items.len();
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    if matched < received {
        if let Some(data) = body.get_mut("data").and_then(Value::as_object_mut) {
            data.insert("total_affected_items".to_string(), Value::from(matched));
        }
    }

    body
}
