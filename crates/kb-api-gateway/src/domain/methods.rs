//! Static metadata for every method the gateway exposes.
//!
//! Methods are keyed by surface and name: `get` and `list` exist on both the
//! chat and the kvstore surface with different meanings.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// API surface a method belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiSurface {
    Chat,
    Team,
    KvStore,
}

impl ApiSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiSurface::Chat => "chat",
            ApiSurface::Team => "team",
            ApiSurface::KvStore => "kvstore",
        }
    }
}

impl fmt::Display for ApiSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method metadata
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Method name as it appears in `Call.method`
    pub name: &'static str,
    /// Surface the method is registered on
    pub surface: ApiSurface,
    /// Calls without options are rejected before routing
    pub options_required: bool,
    /// Changes backend state
    pub is_write: bool,
    /// Upper bound for the whole handler, backend calls included
    pub timeout: Duration,
    /// Brief description
    pub description: &'static str,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

impl MethodInfo {
    /// Read-only method that needs options
    const fn read(surface: ApiSurface, name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            surface,
            options_required: true,
            is_write: false,
            timeout: DEFAULT_TIMEOUT,
            description,
        }
    }

    /// Write method that needs options
    const fn write(surface: ApiSurface, name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            surface,
            options_required: true,
            is_write: true,
            timeout: DEFAULT_TIMEOUT,
            description,
        }
    }

    /// Options may be omitted entirely
    const fn options_optional(mut self) -> Self {
        self.options_required = false;
        self
    }

    const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

use ApiSurface::{Chat, KvStore, Team};

/// Method registry - all supported methods with metadata
pub static METHOD_REGISTRY: LazyLock<HashMap<ApiSurface, HashMap<&'static str, MethodInfo>>> =
    LazyLock::new(|| {
        let methods = [
            // ═══════════════════════════════════════════════════════════════
            // CHAT
            // ═══════════════════════════════════════════════════════════════
            MethodInfo::read(Chat, "list", "Lists the inbox").options_optional(),
            MethodInfo::read(Chat, "read", "Reads a conversation thread"),
            MethodInfo::read(Chat, "get", "Fetches messages by id"),
            MethodInfo::write(Chat, "send", "Sends a text message"),
            MethodInfo::write(Chat, "edit", "Edits a message"),
            MethodInfo::write(Chat, "reaction", "Reacts to a message"),
            MethodInfo::write(Chat, "attach", "Uploads an attachment").with_timeout(UPLOAD_TIMEOUT),
            MethodInfo::read(Chat, "listconvsonname", "Lists conversations on a team or TLF name"),
            MethodInfo::write(Chat, "join", "Joins a conversation"),
            MethodInfo::write(Chat, "leave", "Leaves a conversation"),
            MethodInfo::write(Chat, "advertisecommands", "Advertises bot commands"),
            MethodInfo::write(Chat, "clearcommands", "Clears advertised bot commands")
                .options_optional(),
            MethodInfo::read(Chat, "listcommands", "Lists commands available in a conversation"),
            MethodInfo::read(Chat, "listmembers", "Lists conversation members by role"),
            // ═══════════════════════════════════════════════════════════════
            // TEAM
            // ═══════════════════════════════════════════════════════════════
            MethodInfo::read(Team, "list-team-memberships", "Lists members of a team"),
            MethodInfo::read(Team, "list-user-memberships", "Lists teams of a user"),
            MethodInfo::read(Team, "list-self-memberships", "Lists teams of the session user")
                .options_optional(),
            // ═══════════════════════════════════════════════════════════════
            // KVSTORE
            // ═══════════════════════════════════════════════════════════════
            MethodInfo::read(KvStore, "get", "Reads an entry"),
            MethodInfo::write(KvStore, "put", "Writes an entry"),
            MethodInfo::read(KvStore, "list", "Lists namespaces or entry keys"),
            MethodInfo::write(KvStore, "del", "Deletes an entry"),
        ];

        let mut registry: HashMap<ApiSurface, HashMap<&'static str, MethodInfo>> = HashMap::new();
        for m in methods {
            registry.entry(m.surface).or_default().insert(m.name, m);
        }
        registry
    });

/// Get method info by surface and name
pub fn get_method_info(surface: ApiSurface, method: &str) -> Option<&'static MethodInfo> {
    METHOD_REGISTRY.get(&surface)?.get(method)
}

/// Check if a method is supported
pub fn is_method_supported(surface: ApiSurface, method: &str) -> bool {
    get_method_info(surface, method).is_some()
}

/// Check if a method is a write operation
pub fn is_write_method(surface: ApiSurface, method: &str) -> bool {
    get_method_info(surface, method)
        .map(|m| m.is_write)
        .unwrap_or(false)
}

/// Method names registered on a surface, sorted
pub fn get_methods_by_surface(surface: ApiSurface) -> Vec<&'static str> {
    let mut names: Vec<_> = METHOD_REGISTRY
        .get(&surface)
        .map(|methods| methods.keys().copied().collect())
        .unwrap_or_default();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_registry() {
        assert!(is_method_supported(Chat, "read"));
        assert!(is_method_supported(KvStore, "del"));
        assert!(!is_method_supported(Chat, "del"));
        assert!(!is_method_supported(Team, "frobnicate"));
    }

    #[test]
    fn test_same_name_on_two_surfaces() {
        let chat = get_method_info(Chat, "get").unwrap();
        let kv = get_method_info(KvStore, "get").unwrap();
        assert_eq!(chat.surface, Chat);
        assert_eq!(kv.surface, KvStore);
    }

    #[test]
    fn test_optional_options() {
        assert!(!get_method_info(Chat, "list").unwrap().options_required);
        assert!(!get_method_info(Team, "list-self-memberships").unwrap().options_required);
        assert!(get_method_info(Chat, "read").unwrap().options_required);
        assert!(get_method_info(Team, "list-user-memberships").unwrap().options_required);
        assert!(get_method_info(KvStore, "list").unwrap().options_required);
    }

    #[test]
    fn test_lookup_with_borrowed_name() {
        let name = String::from("listmembers");
        let info = get_method_info(Chat, &name).unwrap();
        assert_eq!(info.name, "listmembers");
        assert!(is_method_supported(KvStore, &String::from("put")));
        assert!(get_method_info(Team, &name).is_none());
    }

    #[test]
    fn test_write_methods() {
        assert!(is_write_method(Chat, "send"));
        assert!(is_write_method(KvStore, "put"));
        assert!(!is_write_method(Chat, "read"));
        assert!(!is_write_method(Chat, "nonexistent"));
    }

    #[test]
    fn test_surface_listing() {
        assert_eq!(get_methods_by_surface(Chat).len(), 14);
        assert_eq!(
            get_methods_by_surface(Team),
            vec![
                "list-self-memberships",
                "list-team-memberships",
                "list-user-memberships"
            ]
        );
        assert_eq!(
            get_methods_by_surface(KvStore),
            vec!["del", "get", "list", "put"]
        );
    }

    #[test]
    fn test_upload_timeout() {
        assert_eq!(get_method_info(Chat, "attach").unwrap().timeout, UPLOAD_TIMEOUT);
        assert_eq!(get_method_info(Chat, "send").unwrap().timeout, DEFAULT_TIMEOUT);
    }
}
