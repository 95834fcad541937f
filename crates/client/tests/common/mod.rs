#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use volunteer_client::{ClientConfig, ClientState};

pub const PRIMARY: &str = "x86_64-pc-linux-gnu";
pub const ALPHA: &str = "http://alpha.example.org/";
pub const BETA: &str = "http://beta.example.org/";

/// Two projects; both have a zero share. `orphan` names an app version
/// that doesn't exist, and `a`/`b` arrived at the same time.
pub const STATE: &str = r#"<client_state>
<host_info>
    <p_ncpus>4</p_ncpus>
    <host_cpid>0123abcd</host_cpid>
</host_info>
<time_stats>
    <on_frac>0.9</on_frac>
</time_stats>
<project>
    <master_url>http://alpha.example.org/</master_url>
    <project_name>Alpha</project_name>
    <authenticator>alpha-secret</authenticator>
    <resource_share>0</resource_share>
    <hostid>11</hostid>
    <rpc_seqno>4</rpc_seqno>
</project>
<app>
    <name>sim</name>
    <user_friendly_name>Simulation</user_friendly_name>
</app>
<file_info>
    <name>sim_1.0</name>
    <status>1</status>
    <executable/>
</file_info>
<file_info>
    <name>in_1</name>
    <status>0</status>
    <download_url>http://alpha.example.org/dl/in_1</download_url>
</file_info>
<file_info>
    <name>out_1</name>
    <status>0</status>
    <upload_when_present/>
    <upload_url>http://alpha.example.org/upload</upload_url>
</file_info>
<app_version>
    <app_name>sim</app_name>
    <version_num>100</version_num>
    <platform>x86_64-pc-linux-gnu</platform>
    <file_ref>
        <file_name>sim_1.0</file_name>
        <main_program/>
    </file_ref>
</app_version>
<workunit>
    <name>wu_1</name>
    <app_name>sim</app_name>
    <version_num>100</version_num>
    <file_ref>
        <file_name>in_1</file_name>
        <open_name>in</open_name>
    </file_ref>
</workunit>
<result>
    <name>a</name>
    <wu_name>wu_1</wu_name>
    <platform>x86_64-pc-linux-gnu</platform>
    <version_num>100</version_num>
    <state>2</state>
    <received_time>100</received_time>
    <file_ref>
        <file_name>out_1</file_name>
    </file_ref>
    <stderr_out>
<stderr_txt>
starting <simulation>
</stderr_txt>
    </stderr_out>
</result>
<result>
    <name>b</name>
    <wu_name>wu_1</wu_name>
    <platform>x86_64-pc-linux-gnu</platform>
    <version_num>100</version_num>
    <state>2</state>
    <received_time>100</received_time>
</result>
<result>
    <name>orphan</name>
    <wu_name>wu_1</wu_name>
    <version_num>999</version_num>
    <received_time>50</received_time>
</result>
<project>
    <master_url>http://beta.example.org/</master_url>
    <project_name>Beta</project_name>
    <resource_share>0</resource_share>
</project>
<active_task_set>
    <active_task>
        <project_master_url>http://alpha.example.org/</project_master_url>
        <result_name>a</result_name>
        <slot>0</slot>
        <fraction_done>0.5</fraction_done>
    </active_task>
</active_task_set>
<platform_name>x86_64-pc-linux-gnu</platform_name>
<user_run_request>2</user_run_request>
<proxy_info>
    <http_server_name>proxy.lan</http_server_name>
    <http_user_passwd>proxy-secret</http_user_passwd>
</proxy_info>
</client_state>
"#;

pub const APP_INFO: &str = r#"<app_info>
    <app>
        <name>sim</name>
    </app>
    <file_info>
        <name>sim_1.0</name>
        <executable/>
    </file_info>
    <app_version>
        <app_name>sim</app_name>
        <version_num>100</version_num>
        <file_ref>
            <file_name>sim_1.0</file_name>
            <main_program/>
        </file_ref>
    </app_version>
</app_info>
"#;

pub fn config(dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::new(dir).with_platform(PRIMARY, &["i686-pc-linux-gnu"]);
    config.rename_attempts = 2;
    config.rename_retry_delay = Duration::from_millis(1);
    config
}

pub fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}

/// A state loaded from `STATE` written as the current generation.
pub fn loaded(dir: &Path) -> ClientState {
    write(dir, "client_state.xml", STATE);
    let mut state = ClientState::new(config(dir));
    state.load();
    state
}
