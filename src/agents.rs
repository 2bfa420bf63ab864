//! Centralized agent registry.
//!
//! All per-agent metadata lives here. Adding a new agent means adding one
//! `AgentDef` entry to `AGENTS`; everything else (waiting detection, prompt
//! dismissal, container command and environment) reads from it.

/// Carriage return, the key a terminal sends for Enter.
pub const ENTER: u8 = 0x0D;

/// First-run confirmation screen and the keys that accept it.
pub struct TrustPrompt {
    /// Literal text that identifies the screen in captured output.
    pub marker: &'static str,
    pub keys: &'static [u8],
    /// How many captures to try before giving up.
    pub attempts: u32,
}

/// Everything we know about a single agent CLI.
pub struct AgentDef {
    /// Canonical name, also the prefix that selects this agent from a program string.
    pub name: &'static str,
    /// Text shown while the agent waits for the operator to approve an action.
    pub waiting_marker: &'static str,
    pub trust_prompt: Option<TrustPrompt>,
    /// Leading argument telling the image entrypoint which CLI to launch.
    pub mode_flag: Option<&'static str>,
    /// Environment variables always injected into the container for this agent.
    pub container_env: &'static [(&'static str, &'static str)],
}

pub const AGENTS: &[AgentDef] = &[
    AgentDef {
        name: "claude",
        waiting_marker: "No, and tell Claude what to do differently",
        trust_prompt: Some(TrustPrompt {
            marker: "Do you trust the files in this folder?",
            keys: &[ENTER],
            attempts: 5,
        }),
        mode_flag: None,
        container_env: &[],
    },
    AgentDef {
        name: "aider",
        waiting_marker: "(Y)es/(N)o/(D)on't ask again",
        trust_prompt: Some(TrustPrompt {
            marker: "Open documentation url for more info",
            keys: &[b'D', ENTER],
            attempts: 10,
        }),
        mode_flag: None,
        container_env: &[],
    },
    AgentDef {
        name: "gemini",
        waiting_marker: "Yes, allow once",
        trust_prompt: Some(TrustPrompt {
            marker: "Open documentation url for more info",
            keys: &[b'D', ENTER],
            attempts: 10,
        }),
        mode_flag: Some("--gemini"),
        container_env: &[("AI_CLI_PREFERENCE", "gemini")],
    },
];

/// The provider family a session's program belongs to.
#[derive(Clone)]
pub enum Agent {
    Known(&'static AgentDef),
    /// Anything not in the registry. Carries the caller's own waiting marker, if any.
    Custom { waiting_marker: Option<String> },
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Agent::Known(def) => write!(f, "Known({})", def.name),
            Agent::Custom { waiting_marker } => f
                .debug_struct("Custom")
                .field("waiting_marker", waiting_marker)
                .finish(),
        }
    }
}

impl Agent {
    /// Resolve from a program string such as `"aider --model sonnet"`.
    /// The first token selects the family when it starts with a registered name.
    pub fn resolve(program: &str) -> Self {
        let first = program.split_whitespace().next().unwrap_or("");
        AGENTS
            .iter()
            .find(|a| first.starts_with(a.name))
            .map(Agent::Known)
            .unwrap_or(Agent::Custom {
                waiting_marker: None,
            })
    }

    pub fn name(&self) -> &str {
        match self {
            Agent::Known(def) => def.name,
            Agent::Custom { .. } => "custom",
        }
    }

    pub fn waiting_marker(&self) -> Option<&str> {
        match self {
            Agent::Known(def) => Some(def.waiting_marker),
            Agent::Custom { waiting_marker } => waiting_marker.as_deref(),
        }
    }

    pub fn trust_prompt(&self) -> Option<&'static TrustPrompt> {
        match self {
            Agent::Known(def) => def.trust_prompt.as_ref(),
            Agent::Custom { .. } => None,
        }
    }

    pub fn mode_flag(&self) -> Option<&'static str> {
        match self {
            Agent::Known(def) => def.mode_flag,
            Agent::Custom { .. } => None,
        }
    }

    pub fn container_env(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Agent::Known(def) => def.container_env,
            Agent::Custom { .. } => &[],
        }
    }

    /// Arguments handed to the image entrypoint: the mode flag, then every
    /// token of `program` after the first.
    pub fn container_command(&self, program: &str) -> Vec<String> {
        let mut cmd: Vec<String> = self.mode_flag().map(str::to_string).into_iter().collect();
        cmd.extend(program.split_whitespace().skip(1).map(str::to_string));
        cmd
    }
}
