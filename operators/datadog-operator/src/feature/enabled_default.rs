//! 默认特性
//!
//! 始终启用：要求节点 Agent 与 Cluster Agent，创建 install-info ConfigMap、
//! 各组件的 ServiceAccount 与默认 RBAC 规则，需要 system-probe 时创建 seccomp 配置。

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_AGENT_DAEMONSET, DD_CLUSTER_AGENT_DEPLOYMENT, DD_CLUSTER_AGENT_SERVICE_ACCOUNT_NAME,
    DD_DATADOG_AGENT_CUSTOM_RESOURCE, OPERATOR_NAME, SYSTEM_PROBE_SECCOMP_KEY,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use crate::store::{policy_rule, service_port, ResourceManagers};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

/// Cluster Agent 服务端口
pub(crate) const CLUSTER_AGENT_SERVICE_PORT: i32 = 5005;

fn non_resource_rule(urls: &[&str]) -> PolicyRule {
    PolicyRule {
        non_resource_urls: Some(urls.iter().map(|u| u.to_string()).collect()),
        verbs: vec!["get".to_string()],
        ..Default::default()
    }
}

fn named_rule(api_group: &str, resource: &str, names: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        resource_names: Some(names.iter().map(|n| n.to_string()).collect()),
        ..policy_rule(&[api_group], &[resource], verbs)
    }
}

/// 节点 Agent 集群级规则
fn agent_cluster_rules(disable_non_resource_rules: bool) -> Vec<PolicyRule> {
    let mut rules = vec![
        policy_rule(
            &[""],
            &["nodes/metrics", "nodes/spec", "nodes/proxy", "nodes/stats"],
            &["get"],
        ),
        policy_rule(&[""], &["endpoints"], &["get"]),
        policy_rule(&["coordination.k8s.io"], &["leases"], &["get"]),
    ];
    if !disable_non_resource_rules {
        rules.push(non_resource_rule(&["/metrics", "/metrics/slis"]));
    }
    rules
}

/// Cluster Agent 命名空间级规则（领导者选举）
fn cluster_agent_rules(leader_election: &str, token: &str) -> Vec<PolicyRule> {
    vec![
        named_rule("", "configmaps", &[leader_election, token], &["get", "update", "create"]),
        policy_rule(&[""], &["configmaps"], &["create"]),
        policy_rule(&["coordination.k8s.io"], &["leases"], &["create"]),
        named_rule("coordination.k8s.io", "leases", &[leader_election], &["get", "update"]),
        policy_rule(&["datadoghq.com"], &["datadogagents"], &["get"]),
    ]
}

/// Cluster Agent 集群级规则
fn cluster_agent_cluster_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(
            &[""],
            &[
                "services",
                "events",
                "endpoints",
                "pods",
                "nodes",
                "componentstatuses",
                "configmaps",
                "namespaces",
            ],
            &["get", "list", "watch"],
        ),
        policy_rule(&["quota.openshift.io"], &["clusterresourcequotas"], &["get", "list"]),
        non_resource_rule(&["/version", "/healthz"]),
        policy_rule(&["autoscaling"], &["horizontalpodautoscalers"], &["list", "watch"]),
        named_rule("", "namespaces", &["kube-system"], &["get"]),
    ]
}

/// Cluster Checks Runner 集群级规则
fn cluster_checks_runner_cluster_rules(
    leader_election: &str,
    disable_non_resource_rules: bool,
) -> Vec<PolicyRule> {
    let mut rules = cluster_agent_cluster_rules();
    rules.extend([
        policy_rule(&[""], &["configmaps"], &["create"]),
        named_rule("", "configmaps", &[leader_election], &["get", "update"]),
        policy_rule(&["coordination.k8s.io"], &["leases"], &["get", "list", "watch"]),
        policy_rule(
            &["metrics.eks.amazonaws.com"],
            &["kcm/metrics", "ksh/metrics"],
            &["get"],
        ),
    ]);
    if !disable_non_resource_rules {
        rules.push(non_resource_rule(&["/metrics", "/metrics/slis"]));
    }
    rules
}

/// system-probe 默认 seccomp 配置
pub(crate) fn default_seccomp_profile() -> String {
    const SYSCALLS: &[&str] = &[
        "accept4", "access", "arch_prctl", "bind", "bpf", "brk", "capget", "capset", "chdir",
        "chmod", "chown", "clock_gettime", "clone", "clone3", "close", "close_range", "connect",
        "copy_file_range", "creat", "dup", "dup2", "dup3", "epoll_create", "epoll_create1",
        "epoll_ctl", "epoll_pwait", "epoll_wait", "eventfd", "eventfd2", "execve", "execveat",
        "exit", "exit_group", "faccessat", "faccessat2", "fchmod", "fchmodat", "fchown",
        "fchownat", "fcntl", "fdatasync", "flock", "fstat", "fstatfs", "fsync", "ftruncate",
        "futex", "futimens", "getcwd", "getdents", "getdents64", "getegid", "geteuid", "getgid",
        "getgroups", "getpeername", "getpgid", "getpgrp", "getpid", "getppid", "getpriority",
        "getrandom", "getresgid", "getresuid", "getrlimit", "getrusage", "getsid", "getsockname",
        "getsockopt", "gettid", "gettimeofday", "getuid", "getxattr", "inotify_add_watch",
        "inotify_init", "inotify_init1", "inotify_rm_watch", "ioctl", "ipc", "listen", "lseek",
        "lstat", "madvise", "memfd_create", "mkdir", "mkdirat", "mknod", "mknodat", "mmap",
        "mprotect", "mremap", "munmap", "nanosleep", "newfstatat", "open", "openat", "openat2",
        "pause", "perf_event_open", "pidfd_open", "pidfd_send_signal", "pipe", "pipe2", "poll",
        "ppoll", "prctl", "pread64", "prlimit64", "pselect6", "pwrite64", "read", "readlink",
        "readlinkat", "recvfrom", "recvmmsg", "recvmsg", "rename", "renameat", "renameat2",
        "restart_syscall", "rmdir", "rseq", "rt_sigaction", "rt_sigpending", "rt_sigprocmask",
        "rt_sigqueueinfo", "rt_sigreturn", "rt_sigsuspend", "rt_sigtimedwait",
        "rt_tgsigqueueinfo", "sched_getaffinity", "sched_yield", "seccomp", "select",
        "semtimedop", "send", "sendmmsg", "sendmsg", "sendto", "set_robust_list",
        "set_tid_address", "setgid", "setgroups", "setitimer", "setns", "setpgid", "setrlimit",
        "setsid", "setsockopt", "setuid", "shutdown", "sigaltstack", "socket", "socketcall",
        "socketpair", "stat", "statfs", "statx", "symlinkat", "sysinfo", "tgkill", "time",
        "tkill", "umask", "uname", "unlink", "unlinkat", "utime", "utimensat", "utimes", "wait4",
        "waitid", "waitpid", "write",
    ];
    json!({
        "defaultAction": "SCMP_ACT_ERRNO",
        "syscalls": [
            {"names": SYSCALLS, "action": "SCMP_ACT_ALLOW", "args": null},
            {
                "names": ["setns"],
                "action": "SCMP_ACT_ALLOW",
                "args": [{"index": 1, "value": 1073741824, "valueTwo": 0, "op": "SCMP_CMP_EQ"}]
            }
        ]
    })
    .to_string()
}

fn install_info() -> String {
    format!(
        "---\ninstall_method:\n  tool: {}\n  tool_version: {}\n  installer_version: {}\n",
        OPERATOR_NAME,
        OPERATOR_NAME,
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Default)]
struct DefaultFeature {
    namespace: String,
    owner_name: String,
    service_accounts: BTreeMap<ComponentName, String>,
    rbac_names: BTreeMap<ComponentName, String>,
    daemonset_name: String,
    deployment_name: String,
    install_info_name: String,
    seccomp_name: String,
    leader_election_name: String,
    token_name: String,
    disable_non_resource_rules: bool,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<DefaultFeature>::default()
}

impl DefaultFeature {
    fn service_account(&self, component: ComponentName) -> &str {
        self.service_accounts.get(&component).map_or("", String::as_str)
    }

    fn rbac_name(&self, component: ComponentName) -> &str {
        self.rbac_names.get(&component).map_or("", String::as_str)
    }

    fn agent_dependencies(
        &self,
        managers: &mut ResourceManagers,
        component: &RequiredComponent,
    ) -> Result<()> {
        let sa = self.service_account(ComponentName::NodeAgent);
        let mut errors = Vec::new();
        if let Err(e) = managers.rbac().add_service_account_by_component(
            &self.namespace,
            sa,
            ComponentName::NodeAgent,
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            self.rbac_name(ComponentName::NodeAgent),
            sa,
            agent_cluster_rules(self.disable_non_resource_rules),
            Some(ComponentName::NodeAgent),
        ) {
            errors.push(e);
        }
        if component.has_container(ContainerName::SystemProbe) {
            if let Err(e) = managers.config_map().add_config_map(
                &self.namespace,
                &self.seccomp_name,
                BTreeMap::from([(SYSTEM_PROBE_SECCOMP_KEY.to_string(), default_seccomp_profile())]),
                BTreeMap::new(),
            ) {
                errors.push(e);
            }
        }
        aggregate(errors)
    }

    fn cluster_agent_dependencies(&self, managers: &mut ResourceManagers) -> Result<()> {
        let sa = self.service_account(ComponentName::ClusterAgent);
        let name = self.rbac_name(ComponentName::ClusterAgent);
        let mut errors = Vec::new();
        let results = [
            managers.rbac().add_service_account_by_component(
                &self.namespace,
                sa,
                ComponentName::ClusterAgent,
            ),
            managers.rbac().add_policy_rules_by_component(
                &self.namespace,
                name,
                sa,
                cluster_agent_rules(&self.leader_election_name, &self.token_name),
                Some(ComponentName::ClusterAgent),
            ),
            managers.rbac().add_cluster_policy_rules_by_component(
                name,
                sa,
                cluster_agent_cluster_rules(),
                Some(ComponentName::ClusterAgent),
            ),
            // 节点 Agent 通过该服务访问 Cluster Agent
            managers.service().add_component_service(
                name,
                ComponentName::ClusterAgent,
                vec![service_port(
                    "agentport",
                    CLUSTER_AGENT_SERVICE_PORT,
                    CLUSTER_AGENT_SERVICE_PORT,
                )],
            ),
        ];
        for result in results {
            if let Err(e) = result {
                errors.push(e);
            }
        }
        aggregate(errors)
    }

    fn cluster_checks_runner_dependencies(&self, managers: &mut ResourceManagers) -> Result<()> {
        let sa = self.service_account(ComponentName::ClusterChecksRunner);
        let mut errors = Vec::new();
        if let Err(e) = managers.rbac().add_service_account_by_component(
            &self.namespace,
            sa,
            ComponentName::ClusterChecksRunner,
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            self.rbac_name(ComponentName::ClusterChecksRunner),
            sa,
            cluster_checks_runner_cluster_rules(
                &self.leader_election_name,
                self.disable_non_resource_rules,
            ),
            Some(ComponentName::ClusterChecksRunner),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }
}

impl Feature for DefaultFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Default
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        self.namespace = dda.namespace_or_default();
        self.owner_name = dda.name_any();
        for component in ComponentName::ALL {
            self.service_accounts
                .insert(component, dda.service_account_name(component));
            self.rbac_names
                .insert(component, dda.rbac_resource_name(component));
        }
        self.daemonset_name = dda.component_resource_name(ComponentName::NodeAgent);
        self.deployment_name = dda.component_resource_name(ComponentName::ClusterAgent);
        self.install_info_name = dda.child_name("install-info");
        self.seccomp_name = dda.child_name("system-probe-seccomp");
        self.leader_election_name = dda.child_name("leader-election");
        self.token_name = dda.child_name("token");
        self.disable_non_resource_rules = bool_value(dda.global().disable_non_resource_rules);

        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            cluster_checks_runner: RequiredComponent::default(),
        }
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        components: &RequiredComponents,
    ) -> Result<()> {
        managers.config_map().add_config_map(
            &self.namespace,
            &self.install_info_name,
            BTreeMap::from([("install_info".to_string(), install_info())]),
            BTreeMap::new(),
        )?;

        let mut errors = Vec::new();
        if components.agent.is_enabled() {
            if let Err(e) = self.agent_dependencies(managers, &components.agent) {
                errors.push(e);
            }
        }
        if components.cluster_agent.is_enabled() {
            if let Err(e) = self.cluster_agent_dependencies(managers) {
                errors.push(e);
            }
        }
        if components.cluster_checks_runner.is_enabled() {
            if let Err(e) = self.cluster_checks_runner_dependencies(managers) {
                errors.push(e);
            }
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let mut envs = managers.env_var();
        envs.add_env_var(env(
            DD_CLUSTER_AGENT_SERVICE_ACCOUNT_NAME,
            self.service_account(ComponentName::ClusterAgent).to_string(),
        ));
        envs.add_env_var(env(DD_AGENT_DAEMONSET, self.daemonset_name.clone()));
        envs.add_env_var(env(DD_CLUSTER_AGENT_DEPLOYMENT, self.deployment_name.clone()));
        envs.add_env_var(env(DD_DATADOG_AGENT_CUSTOM_RESOURCE, self.owner_name.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::env_value;
    use crate::store::{ObjectKind, StoreObject};
    use datadog_common::DatadogFeatures;

    fn configured(components: &RequiredComponents) -> (Box<dyn Feature>, ResourceManagers) {
        let mut feature = build(&Options::default());
        feature.configure(&dda_with_features(DatadogFeatures::default()));
        let mut managers = resource_managers();
        feature.manage_dependencies(&mut managers, components).unwrap();
        (feature, managers)
    }

    #[test]
    fn test_always_requires_agent_and_cluster_agent() {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda_with_features(DatadogFeatures::default()));
        assert_eq!(required.agent.is_required, Some(true));
        assert!(required.cluster_agent.has_container(ContainerName::ClusterAgent));
        assert!(!required.cluster_checks_runner.is_configured());
    }

    #[test]
    fn test_dependencies_for_default_components() {
        let mut feature = build(&Options::default());
        let components = feature.configure(&dda_with_features(DatadogFeatures::default()));
        let (_, managers) = configured(&components);
        let store = managers.store();

        assert!(store
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-install-info")
            .is_some());
        assert!(store
            .get(ObjectKind::ServiceAccount, "monitoring", "datadog-agent")
            .is_some());
        assert!(store
            .get(ObjectKind::ClusterRole, "", "datadog-cluster-agent")
            .is_some());
        assert!(store
            .get(ObjectKind::Service, "monitoring", "datadog-cluster-agent")
            .is_some());
        assert!(store
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-system-probe-seccomp")
            .is_none());
        assert!(store
            .get(ObjectKind::ServiceAccount, "monitoring", "datadog-cluster-checks-runner")
            .is_none());
    }

    #[test]
    fn test_seccomp_config_map_when_system_probe_required() {
        let components = RequiredComponents {
            agent: RequiredComponent::required(&[
                ContainerName::CoreAgent,
                ContainerName::SystemProbe,
            ]),
            ..Default::default()
        };
        let (_, managers) = configured(&components);
        match managers
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-system-probe-seccomp")
        {
            Some(StoreObject::ConfigMap(cm)) => {
                let profile = &cm.data.as_ref().unwrap()[SYSTEM_PROBE_SECCOMP_KEY];
                let value: serde_json::Value = serde_json::from_str(profile).unwrap();
                assert_eq!(value["defaultAction"], "SCMP_ACT_ERRNO");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_resource_rules_can_be_disabled() {
        let rules = agent_cluster_rules(true);
        assert!(rules.iter().all(|r| r.non_resource_urls.is_none()));
        assert!(agent_cluster_rules(false)
            .iter()
            .any(|r| r.non_resource_urls.is_some()));
    }

    #[test]
    fn test_cluster_agent_env() {
        let mut feature = build(&Options::default());
        feature.configure(&dda_with_features(DatadogFeatures::default()));
        let mut managers = cluster_agent_managers();
        feature.manage_cluster_agent(&mut managers).unwrap();
        let template = managers.finalize();

        assert_eq!(
            env_value(&template, ContainerName::ClusterAgent, DD_AGENT_DAEMONSET).as_deref(),
            Some("datadog-agent")
        );
        assert_eq!(
            env_value(&template, ContainerName::ClusterAgent, DD_DATADOG_AGENT_CUSTOM_RESOURCE)
                .as_deref(),
            Some("datadog")
        );
    }
}
