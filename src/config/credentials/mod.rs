use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `MARQUEE_*` env var that is set and non-empty will overwrite the
        /// corresponding config field, so the Twilio secrets never have to sit
        /// in the config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "twilio-account-sid", "MARQUEE_TWILIO_ACCOUNT_SID" => twilio.account_sid;
    "twilio-auth-token",  "MARQUEE_TWILIO_AUTH_TOKEN"  => twilio.auth_token;
}

/// Where a credential's effective value came from.
pub fn detect_source(name: &str, config: &Config) -> &'static str {
    let env_set = CREDENTIAL_ENV_VARS
        .iter()
        .find(|(slot, _)| *slot == name)
        .is_some_and(|(_, env)| std::env::var(env).is_ok_and(|v| !v.is_empty()));
    if env_set {
        return "env";
    }
    match get_credential_value(config, name) {
        Some(v) if !v.is_empty() => "config",
        _ => "[empty]",
    }
}
