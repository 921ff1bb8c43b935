use std::path::MAIN_SEPARATOR;

use crate::core::EnvExpander;

/// Extensions switched on when an interpreter is registered for the first time
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "php_mbstring.dll",
    "php_curl.dll",
    "php_gd2.dll",
    "php_gettext.dll",
    "php_openssl.dll",
    "php_exif.dll",
    "php_mysqli.dll",
    "php_pdo_mysql.dll",
    "php_pdo_sqlite.dll",
    "php_soap.dll",
    "php_xmlrpc.dll",
    "php_imap.dll",
    "php_tidy.dll",
];

/// Reconciliation settings
///
/// Every fixed literal the engine relies on lives here so tests and embedders
/// can override it. Defaults describe a FastCGI PHP install on IIS.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Routing pattern the interpreter is registered under
    pub handler_pattern: String,

    /// Executable file names accepted by registration (case-insensitive)
    pub executable_names: Vec<String>,

    /// Settings file expected next to the executable
    pub settings_file_name: String,

    /// Templates copied when the settings file is missing, in preference order
    pub settings_templates: Vec<String>,

    /// Directory beside the executable that holds the extension modules
    pub extensions_dir_name: String,

    /// Appended to the settings path to name the pre-repair backup
    pub backup_suffix: String,

    /// Base name for new routing entries
    pub handler_name_prefix: String,

    /// Module binding tag written into new routing entries
    pub module_binding: String,

    /// Request bound applied both to the pool entry and its environment
    pub max_requests: u64,

    /// Worker activity timeout in seconds
    pub activity_timeout: u64,

    /// Worker request timeout in seconds
    pub request_timeout: u64,

    /// `max_execution_time` for freshly registered interpreters
    pub max_execution_time: u64,

    /// Location for error logs and session files, may contain `%NAME%` tokens
    pub temp_directory: String,

    /// Environment variable holding the per-worker request bound
    pub max_requests_variable: String,

    /// Environment variable pointing at the settings directory
    pub settings_dir_variable: String,

    /// Extensions enabled on first registration
    pub default_extensions: Vec<String>,

    /// Host variables consulted before the process environment
    pub host_variables: Vec<(String, String)>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            handler_pattern: "*.php".to_string(),
            executable_names: vec!["php-cgi.exe".to_string(), "php.exe".to_string()],
            settings_file_name: "php.ini".to_string(),
            settings_templates: vec![
                "php.ini-recommended".to_string(),
                "php.ini-production".to_string(),
            ],
            extensions_dir_name: "ext".to_string(),
            backup_suffix: "-phpmanager".to_string(),
            handler_name_prefix: "PHP_via_FastCGI".to_string(),
            module_binding: "FastCgiModule".to_string(),
            max_requests: 10000,
            activity_timeout: 600,
            request_timeout: 600,
            max_execution_time: 300,
            temp_directory: format!("%WINDIR%{}Temp", MAIN_SEPARATOR),
            max_requests_variable: "PHP_FCGI_MAX_REQUESTS".to_string(),
            settings_dir_variable: "PHPRC".to_string(),
            default_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            host_variables: Vec::new(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the routing pattern
    pub fn handler_pattern(mut self, pattern: &str) -> Self {
        self.handler_pattern = pattern.to_string();
        self
    }

    /// Set the request bound
    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    /// Set the activity and request timeouts
    pub fn timeouts(mut self, activity: u64, request: u64) -> Self {
        self.activity_timeout = activity;
        self.request_timeout = request;
        self
    }

    /// Set the temp directory used for logs and sessions
    pub fn temp_directory(mut self, dir: &str) -> Self {
        self.temp_directory = dir.to_string();
        self
    }

    /// Replace the first-registration extension allow-list
    pub fn default_extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_extensions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Define a host variable for `%NAME%` expansion
    pub fn host_variable(mut self, name: &str, value: &str) -> Self {
        self.host_variables.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_recognized_executable(&self, file_name: &str) -> bool {
        self.executable_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(file_name))
    }

    pub fn expander(&self) -> EnvExpander {
        EnvExpander::with_variables(
            self.host_variables
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone())),
        )
    }
}
