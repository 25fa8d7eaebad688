//! 常量定义
//!
//! 渲染到容器中的环境变量名称属于外部 Agent 二进制的固定契约，必须逐字保持一致。
//! 此外还包括卷名称、挂载路径、注解键与默认镜像版本。

// 通用环境变量
pub const DD_API_KEY: &str = "DD_API_KEY";
pub const DD_APP_KEY: &str = "DD_APP_KEY";
pub const DD_SITE: &str = "DD_SITE";
pub const DD_DD_URL: &str = "DD_DD_URL";
pub const DD_LOG_LEVEL: &str = "DD_LOG_LEVEL";
pub const DD_CLUSTER_NAME: &str = "DD_CLUSTER_NAME";
pub const DD_TAGS: &str = "DD_TAGS";
pub const DD_HEALTH_PORT: &str = "DD_HEALTH_PORT";
pub const DD_ORIGIN_DETECTION_UNIFIED: &str = "DD_ORIGIN_DETECTION_UNIFIED";
pub const DD_POD_LABELS_AS_TAGS: &str = "DD_KUBERNETES_POD_LABELS_AS_TAGS";
pub const DD_POD_ANNOTATIONS_AS_TAGS: &str = "DD_KUBERNETES_POD_ANNOTATIONS_AS_TAGS";
pub const DD_NODE_LABELS_AS_TAGS: &str = "DD_KUBERNETES_NODE_LABELS_AS_TAGS";
pub const DD_NAMESPACE_LABELS_AS_TAGS: &str = "DD_KUBERNETES_NAMESPACE_LABELS_AS_TAGS";
pub const DD_NAMESPACE_ANNOTATIONS_AS_TAGS: &str = "DD_KUBERNETES_NAMESPACE_ANNOTATIONS_AS_TAGS";
pub const DD_KUBERNETES_RESOURCES_LABELS_AS_TAGS: &str = "DD_KUBERNETES_RESOURCES_LABELS_AS_TAGS";
pub const DD_KUBERNETES_RESOURCES_ANNOTATIONS_AS_TAGS: &str =
    "DD_KUBERNETES_RESOURCES_ANNOTATIONS_AS_TAGS";
pub const DD_KUBERNETES_KUBELET_HOST: &str = "DD_KUBERNETES_KUBELET_HOST";
pub const DD_KUBELET_TLS_VERIFY: &str = "DD_KUBELET_TLS_VERIFY";
pub const DD_KUBELET_CLIENT_CA: &str = "DD_KUBELET_CLIENT_CA";
pub const DD_CRI_SOCKET_PATH: &str = "DD_CRI_SOCKET_PATH";
pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DD_CLUSTER_AGENT_AUTH_TOKEN: &str = "DD_CLUSTER_AGENT_AUTH_TOKEN";
pub const DD_CLUSTER_AGENT_ENABLED: &str = "DD_CLUSTER_AGENT_ENABLED";
pub const DD_CLUSTER_AGENT_KUBE_SERVICE_NAME: &str = "DD_CLUSTER_AGENT_KUBERNETES_SERVICE_NAME";
pub const DD_CLUSTER_AGENT_SERVICE_ACCOUNT_NAME: &str = "DD_CLUSTER_AGENT_SERVICE_ACCOUNT_NAME";
pub const DD_AGENT_DAEMONSET: &str = "DD_AGENT_DAEMONSET";
pub const DD_CLUSTER_AGENT_DEPLOYMENT: &str = "DD_CLUSTER_AGENT_DEPLOYMENT";
pub const DD_DATADOG_AGENT_CUSTOM_RESOURCE: &str = "DD_DATADOG_AGENT_CUSTOM_RESOURCE";
pub const DD_LEADER_ELECTION: &str = "DD_LEADER_ELECTION";
pub const DD_SECRET_BACKEND_COMMAND: &str = "DD_SECRET_BACKEND_COMMAND";
pub const DD_SECRET_BACKEND_ARGUMENTS: &str = "DD_SECRET_BACKEND_ARGUMENTS";
pub const DD_SECRET_BACKEND_TIMEOUT: &str = "DD_SECRET_BACKEND_TIMEOUT";
pub const DD_HOSTNAME: &str = "DD_HOSTNAME";
pub const DD_HOST_ROOT: &str = "HOST_ROOT";
pub const DD_IGNORE_AUTOCONF: &str = "DD_IGNORE_AUTOCONF";
pub const KUBERNETES_ENV: &str = "KUBERNETES";
pub const DD_AUTH_TOKEN_FILE_PATH: &str = "DD_AUTH_TOKEN_FILE_PATH";
pub const DD_POD_NAME: &str = "DD_POD_NAME";
pub const DD_KUBE_RESOURCES_NAMESPACE: &str = "DD_KUBE_RESOURCES_NAMESPACE";
pub const DD_ENABLE_METADATA_COLLECTION: &str = "DD_ENABLE_METADATA_COLLECTION";
pub const DD_USE_DOGSTATSD: &str = "DD_USE_DOGSTATSD";

// FIPS
pub const DD_FIPS_ENABLED: &str = "DD_FIPS_ENABLED";
pub const DD_FIPS_PORT_RANGE_START: &str = "DD_FIPS_PORT_RANGE_START";
pub const DD_FIPS_USE_HTTPS: &str = "DD_FIPS_USE_HTTPS";
pub const DD_FIPS_LOCAL_ADDRESS: &str = "DD_FIPS_LOCAL_ADDRESS";

// 进程采集
pub const DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT: &str = "DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT";
pub const DD_PROCESS_COLLECTION_ENABLED: &str = "DD_PROCESS_CONFIG_PROCESS_COLLECTION_ENABLED";
pub const DD_PROCESS_DISCOVERY_ENABLED: &str = "DD_PROCESS_CONFIG_PROCESS_DISCOVERY_ENABLED";
pub const DD_CONTAINER_COLLECTION_ENABLED: &str = "DD_PROCESS_CONFIG_CONTAINER_COLLECTION_ENABLED";
pub const DD_PROCESS_SCRUB_ARGS: &str = "DD_PROCESS_CONFIG_SCRUB_ARGS";
pub const DD_PROCESS_STRIP_ARGS: &str = "DD_PROCESS_CONFIG_STRIP_PROC_ARGUMENTS";
pub const DD_PROCESS_AGENT_ENABLED: &str = "DD_PROCESS_AGENT_ENABLED";

// 日志采集
pub const DD_LOGS_ENABLED: &str = "DD_LOGS_ENABLED";
pub const DD_LOGS_CONTAINER_COLLECT_ALL: &str = "DD_LOGS_CONFIG_CONTAINER_COLLECT_ALL";
pub const DD_LOGS_CONTAINER_USE_FILE: &str = "DD_LOGS_CONFIG_K8S_CONTAINER_USE_FILE";
pub const DD_LOGS_OPEN_FILES_LIMIT: &str = "DD_LOGS_CONFIG_OPEN_FILES_LIMIT";

// system-probe
pub const DD_SYSTEM_PROBE_ENABLED: &str = "DD_SYSTEM_PROBE_ENABLED";
pub const DD_SYSTEM_PROBE_SOCKET: &str = "DD_SYSPROBE_SOCKET";
pub const DD_SYSTEM_PROBE_EXTERNAL: &str = "DD_SYSTEM_PROBE_EXTERNAL";
pub const DD_SYSTEM_PROBE_NPM_ENABLED: &str = "DD_SYSTEM_PROBE_NETWORK_ENABLED";
pub const DD_SYSTEM_PROBE_CONNTRACK_ENABLED: &str = "DD_SYSTEM_PROBE_CONNTRACK_ENABLED";
pub const DD_SYSTEM_PROBE_COLLECT_DNS_STATS: &str = "DD_COLLECT_DNS_STATS";
pub const DD_SYSTEM_PROBE_USM_ENABLED: &str = "DD_SERVICE_MONITORING_ENABLED";
pub const DD_ENABLE_OOM_KILL: &str = "DD_SYSTEM_PROBE_CONFIG_ENABLE_OOM_KILL";
pub const DD_ENABLE_TCP_QUEUE_LENGTH: &str = "DD_SYSTEM_PROBE_CONFIG_ENABLE_TCP_QUEUE_LENGTH";
pub const DEFAULT_SYSTEM_PROBE_SOCKET_PATH: &str = "/var/run/sysprobe/sysprobe.sock";

// 安全
pub const DD_RUNTIME_SECURITY_ENABLED: &str = "DD_RUNTIME_SECURITY_CONFIG_ENABLED";
pub const DD_RUNTIME_SECURITY_SOCKET: &str = "DD_RUNTIME_SECURITY_CONFIG_SOCKET";
pub const DD_RUNTIME_SECURITY_SYSCALL_MONITOR: &str =
    "DD_RUNTIME_SECURITY_CONFIG_SYSCALL_MONITOR_ENABLED";
pub const DD_RUNTIME_SECURITY_POLICIES_DIR: &str = "DD_RUNTIME_SECURITY_CONFIG_POLICIES_DIR";
pub const DD_COMPLIANCE_ENABLED: &str = "DD_COMPLIANCE_CONFIG_ENABLED";
pub const DD_COMPLIANCE_HOST_BENCHMARKS: &str = "DD_COMPLIANCE_CONFIG_HOST_BENCHMARKS_ENABLED";
pub const DD_COMPLIANCE_CHECK_INTERVAL: &str = "DD_COMPLIANCE_CONFIG_CHECK_INTERVAL";
pub const DEFAULT_RUNTIME_SECURITY_SOCKET_PATH: &str = "/var/run/sysprobe/runtime-security.sock";

// APM / DogStatsD / OTLP
pub const DD_APM_ENABLED: &str = "DD_APM_ENABLED";
pub const DD_APM_NON_LOCAL_TRAFFIC: &str = "DD_APM_NON_LOCAL_TRAFFIC";
pub const DD_APM_RECEIVER_PORT: &str = "DD_APM_RECEIVER_PORT";
pub const DD_APM_RECEIVER_SOCKET: &str = "DD_APM_RECEIVER_SOCKET";
pub const DD_DOGSTATSD_ORIGIN_DETECTION: &str = "DD_DOGSTATSD_ORIGIN_DETECTION";
pub const DD_DOGSTATSD_ORIGIN_DETECTION_CLIENT: &str = "DD_DOGSTATSD_ORIGIN_DETECTION_CLIENT";
pub const DD_DOGSTATSD_TAG_CARDINALITY: &str = "DD_DOGSTATSD_TAG_CARDINALITY";
pub const DD_DOGSTATSD_NON_LOCAL_TRAFFIC: &str = "DD_DOGSTATSD_NON_LOCAL_TRAFFIC";
pub const DD_DOGSTATSD_PORT: &str = "DD_DOGSTATSD_PORT";
pub const DD_DOGSTATSD_SOCKET: &str = "DD_DOGSTATSD_SOCKET";
pub const DD_OTLP_GRPC_ENDPOINT: &str = "DD_OTLP_CONFIG_RECEIVER_PROTOCOLS_GRPC_ENDPOINT";
pub const DD_OTLP_HTTP_ENDPOINT: &str = "DD_OTLP_CONFIG_RECEIVER_PROTOCOLS_HTTP_ENDPOINT";
pub const DEFAULT_OTLP_GRPC_PORT: i32 = 4317;
pub const DEFAULT_OTLP_HTTP_PORT: i32 = 4318;

// SBOM
pub const DD_SBOM_ENABLED: &str = "DD_SBOM_ENABLED";
pub const DD_SBOM_CONTAINER_IMAGE_ENABLED: &str = "DD_SBOM_CONTAINER_IMAGE_ENABLED";
pub const DD_SBOM_CONTAINER_IMAGE_ANALYZERS: &str = "DD_SBOM_CONTAINER_IMAGE_ANALYZERS";
pub const DD_SBOM_HOST_ENABLED: &str = "DD_SBOM_HOST_ENABLED";
pub const DD_SBOM_HOST_ANALYZERS: &str = "DD_SBOM_HOST_ANALYZERS";

// 集群级特性
pub const DD_COLLECT_KUBERNETES_EVENTS: &str = "DD_COLLECT_KUBERNETES_EVENTS";
pub const DD_LEADER_LEASE_NAME: &str = "DD_LEADER_LEASE_NAME";
pub const DD_CLUSTER_AGENT_TOKEN_NAME: &str = "DD_CLUSTER_AGENT_TOKEN_NAME";
pub const DD_ORCHESTRATOR_EXPLORER_ENABLED: &str = "DD_ORCHESTRATOR_EXPLORER_ENABLED";
pub const DD_ORCHESTRATOR_EXPLORER_CONTAINER_SCRUBBING: &str =
    "DD_ORCHESTRATOR_EXPLORER_CONTAINER_SCRUBBING_ENABLED";
pub const DD_ORCHESTRATOR_EXPLORER_EXTRA_TAGS: &str = "DD_ORCHESTRATOR_EXPLORER_EXTRA_TAGS";
pub const DD_ORCHESTRATOR_EXPLORER_DD_URL: &str = "DD_ORCHESTRATOR_EXPLORER_ORCHESTRATOR_DD_URL";
pub const DD_KUBE_STATE_METRICS_CORE_ENABLED: &str = "DD_KUBE_STATE_METRICS_CORE_ENABLED";
pub const DD_KUBE_STATE_METRICS_CORE_CONFIGMAP: &str = "DD_KUBE_STATE_METRICS_CORE_CONFIGMAP_NAME";
pub const DD_ADMISSION_CONTROLLER_ENABLED: &str = "DD_ADMISSION_CONTROLLER_ENABLED";
pub const DD_ADMISSION_CONTROLLER_MUTATE_UNLABELLED: &str =
    "DD_ADMISSION_CONTROLLER_MUTATE_UNLABELLED";
pub const DD_ADMISSION_CONTROLLER_SERVICE_NAME: &str = "DD_ADMISSION_CONTROLLER_SERVICE_NAME";
pub const DD_ADMISSION_CONTROLLER_INJECT_CONFIG_MODE: &str =
    "DD_ADMISSION_CONTROLLER_INJECT_CONFIG_MODE";
pub const DD_ADMISSION_CONTROLLER_WEBHOOK_NAME: &str = "DD_ADMISSION_CONTROLLER_WEBHOOK_NAME";
pub const DD_ADMISSION_CONTROLLER_LOCAL_SERVICE_NAME: &str =
    "DD_ADMISSION_CONTROLLER_INJECT_CONFIG_LOCAL_SERVICE_NAME";
pub const DD_EXTERNAL_METRICS_PROVIDER_ENABLED: &str = "DD_EXTERNAL_METRICS_PROVIDER_ENABLED";
pub const DD_EXTERNAL_METRICS_PROVIDER_PORT: &str = "DD_EXTERNAL_METRICS_PROVIDER_PORT";
pub const DD_EXTERNAL_METRICS_PROVIDER_USE_DATADOGMETRIC_CRD: &str =
    "DD_EXTERNAL_METRICS_PROVIDER_USE_DATADOGMETRIC_CRD";
pub const DD_CLUSTER_CHECKS_ENABLED: &str = "DD_CLUSTER_CHECKS_ENABLED";
pub const DD_EXTRA_CONFIG_PROVIDERS: &str = "DD_EXTRA_CONFIG_PROVIDERS";
pub const DD_EXTRA_LISTENERS: &str = "DD_EXTRA_LISTENERS";
pub const DD_CLC_RUNNER_ID: &str = "DD_CLC_RUNNER_ID";
pub const DD_CLC_RUNNER_ENABLED: &str = "DD_CLC_RUNNER_ENABLED";
pub const DD_CLC_RUNNER_HOST: &str = "DD_CLC_RUNNER_HOST";
pub const DD_REMOTE_CONFIGURATION_ENABLED: &str = "DD_REMOTE_CONFIGURATION_ENABLED";
pub const DD_PROMETHEUS_SCRAPE_ENABLED: &str = "DD_PROMETHEUS_SCRAPE_ENABLED";
pub const DD_PROMETHEUS_SCRAPE_SERVICE_ENDPOINTS: &str = "DD_PROMETHEUS_SCRAPE_SERVICE_ENDPOINTS";
pub const DD_PROMETHEUS_SCRAPE_CHECKS: &str = "DD_PROMETHEUS_SCRAPE_CHECKS";
pub const DD_PROMETHEUS_SCRAPE_VERSION: &str = "DD_PROMETHEUS_SCRAPE_VERSION";
pub const DD_AUTOSCALING_WORKLOAD_ENABLED: &str = "DD_AUTOSCALING_WORKLOAD_ENABLED";
pub const DD_AUTOSCALING_FAILOVER_ENABLED: &str = "DD_AUTOSCALING_FAILOVER_ENABLED";
pub const DD_AUTOSCALING_FAILOVER_METRICS: &str = "DD_AUTOSCALING_FAILOVER_METRICS";
pub const DD_AUTOSCALING_CLUSTER_ENABLED: &str = "DD_AUTOSCALING_CLUSTER_ENABLED";

// GPU 与服务发现
pub const DD_GPU_MONITORING_ENABLED: &str = "DD_GPU_MONITORING_ENABLED";
pub const DD_GPU_ENABLED: &str = "DD_GPU_ENABLED";
pub const DD_ENABLE_NVML_DETECTION: &str = "DD_ENABLE_NVML_DETECTION";
pub const DD_GPU_CONFIGURE_CGROUP_PERMS: &str = "DD_GPU_MONITORING_CONFIGURE_CGROUP_PERMS";
pub const NVIDIA_VISIBLE_DEVICES: &str = "NVIDIA_VISIBLE_DEVICES";
pub const DD_KUBERNETES_POD_RESOURCES_SOCKET: &str = "DD_KUBERNETES_KUBELET_PODRESOURCES_SOCKET";
pub const DD_DISCOVERY_ENABLED: &str = "DD_DISCOVERY_ENABLED";
pub const DD_DISCOVERY_NETWORK_STATS_ENABLED: &str = "DD_DISCOVERY_NETWORK_STATS_ENABLED";

// 默认值
pub const DEFAULT_AGENT_HEALTH_PORT: i32 = 5555;
pub const DEFAULT_LIVENESS_PROBE_PATH: &str = "/live";
pub const DEFAULT_READINESS_PROBE_PATH: &str = "/ready";
pub const DEFAULT_STARTUP_PROBE_PATH: &str = "/startup";
pub const DEFAULT_APM_PORT: i32 = 8126;
pub const DEFAULT_DOGSTATSD_PORT: i32 = 8125;
pub const DEFAULT_METRICS_PROVIDER_PORT: i32 = 8443;
pub const AGENT_LATEST_VERSION: &str = "7.64.0";
pub const CLUSTER_AGENT_LATEST_VERSION: &str = "7.64.0";
pub const FIPS_PROXY_LATEST_VERSION: &str = "1.1.9";
pub const AGENT_IMAGE_NAME: &str = "agent";
pub const CLUSTER_AGENT_IMAGE_NAME: &str = "cluster-agent";
pub const FIPS_PROXY_IMAGE_NAME: &str = "fips-proxy";
/// 进程检查可以在核心 Agent 中运行的最低版本
pub const RUN_IN_CORE_AGENT_MIN_VERSION: &str = "7.53.0";

// 卷与挂载路径
pub const CONFIG_VOLUME_NAME: &str = "config";
pub const CONFIG_VOLUME_PATH: &str = "/etc/datadog-agent";
pub const LOGS_VOLUME_NAME: &str = "logdatadog";
pub const LOGS_VOLUME_PATH: &str = "/var/log/datadog";
pub const AUTH_VOLUME_NAME: &str = "datadog-agent-auth";
pub const AUTH_VOLUME_PATH: &str = "/etc/datadog-agent/auth";
pub const AUTH_TOKEN_FILE_PATH: &str = "/etc/datadog-agent/auth/token";
pub const CERTIFICATES_VOLUME_NAME: &str = "certificates";
pub const CERTIFICATES_VOLUME_PATH: &str = "/etc/datadog-agent/certificates";
pub const TMP_VOLUME_NAME: &str = "tmp";
pub const TMP_VOLUME_PATH: &str = "/tmp";
pub const INIT_VOLUME_MOUNT_PATH: &str = "/opt/datadog-agent";
pub const INSTALL_INFO_VOLUME_NAME: &str = "installinfo";
pub const INSTALL_INFO_VOLUME_PATH: &str = "/etc/datadog-agent/install_info";
pub const PROCDIR_VOLUME_NAME: &str = "procdir";
pub const PROCDIR_HOST_PATH: &str = "/proc";
pub const PROCDIR_MOUNT_PATH: &str = "/host/proc";
pub const CGROUPS_VOLUME_NAME: &str = "cgroups";
pub const CGROUPS_HOST_PATH: &str = "/sys/fs/cgroup";
pub const CGROUPS_MOUNT_PATH: &str = "/host/sys/fs/cgroup";
pub const PASSWD_VOLUME_NAME: &str = "passwd";
pub const PASSWD_HOST_PATH: &str = "/etc/passwd";
pub const PASSWD_MOUNT_PATH: &str = "/etc/passwd";
pub const DEBUGFS_VOLUME_NAME: &str = "debugfs";
pub const DEBUGFS_PATH: &str = "/sys/kernel/debug";
pub const MODULES_VOLUME_NAME: &str = "modules";
pub const MODULES_VOLUME_PATH: &str = "/lib/modules";
pub const SRC_VOLUME_NAME: &str = "src";
pub const SRC_VOLUME_PATH: &str = "/usr/src";
pub const SYSTEM_PROBE_SOCKET_VOLUME_NAME: &str = "sysprobe-socket-dir";
pub const SYSTEM_PROBE_SOCKET_VOLUME_PATH: &str = "/var/run/sysprobe";
pub const GROUP_VOLUME_NAME: &str = "group";
pub const GROUP_HOST_PATH: &str = "/etc/group";
pub const GROUP_MOUNT_PATH: &str = "/etc/group";
pub const TRACEFS_VOLUME_NAME: &str = "tracefs";
pub const TRACEFS_PATH: &str = "/sys/kernel/tracing";
pub const SECURITYFS_VOLUME_NAME: &str = "securityfs";
pub const SECURITYFS_HOST_PATH: &str = "/sys/kernel/security";
pub const SECURITYFS_MOUNT_PATH: &str = "/host/sys/kernel/security";
pub const OS_RELEASE_VOLUME_NAME: &str = "host-osrelease";
pub const OS_RELEASE_HOST_PATH: &str = "/etc/os-release";
pub const OS_RELEASE_MOUNT_PATH: &str = "/host/etc/os-release";
pub const HOST_ROOT_VOLUME_NAME: &str = "hostroot";
pub const HOST_ROOT_HOST_PATH: &str = "/";
pub const HOST_ROOT_MOUNT_PATH: &str = "/host/root";
pub const RUNTIME_SOCKET_VOLUME_NAME: &str = "runtimesocketdir";
pub const HOST_CRI_SOCKET_PATH_PREFIX: &str = "/host";
pub const KUBELET_CA_VOLUME_NAME: &str = "kubelet-ca";
pub const KUBELET_AGENT_CA_PATH: &str = "/var/run/host-kubelet-ca.crt";
pub const DOGSTATSD_SOCKET_VOLUME_NAME: &str = "dsdsocket";
pub const DOGSTATSD_SOCKET_HOST_PATH: &str = "/var/run/datadog";
pub const DOGSTATSD_SOCKET_LOCAL_PATH: &str = "/var/run/datadog";
pub const DOGSTATSD_SOCKET_NAME: &str = "dsd.socket";
pub const APM_SOCKET_VOLUME_NAME: &str = "apmsocket";
pub const APM_SOCKET_HOST_PATH: &str = "/var/run/datadog";
pub const APM_SOCKET_LOCAL_PATH: &str = "/var/run/datadog";
pub const APM_SOCKET_NAME: &str = "apm.socket";
pub const SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_NAME: &str = "compliancedir";
pub const SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_PATH: &str = "/etc/datadog-agent/compliance.d";
pub const SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_NAME: &str = "runtimepoliciesdir";
pub const SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_PATH: &str =
    "/etc/datadog-agent/runtime-security.d";
pub const NVIDIA_DEVICES_VOLUME_NAME: &str = "nvidia-devices";
pub const NVIDIA_DEVICES_MOUNT_PATH: &str = "/var/run/nvidia-container-devices/all";
pub const DEV_NULL_PATH: &str = "/dev/null";
pub const POD_RESOURCES_VOLUME_NAME: &str = "kubelet-pod-resources";
pub const HOST_RUN_VOLUME_NAME: &str = "hostrun";
pub const HOST_RUN_PATH: &str = "/run";
pub const HOST_RUN_MOUNT_PATH: &str = "/host/run";
pub const HELM_CHECK_CONFIG_VOLUME_NAME: &str = "helm-check-config";
pub const SECCOMP_ROOT_VOLUME_NAME: &str = "seccomp-root";
pub const SECCOMP_ROOT_VOLUME_PATH: &str = "/host/var/lib/kubelet/seccomp";
pub const SECCOMP_ROOT_HOST_PATH: &str = "/var/lib/kubelet/seccomp";
pub const SECCOMP_SECURITY_VOLUME_NAME: &str = "datadog-agent-security";
pub const SECCOMP_SECURITY_VOLUME_PATH: &str = "/etc/config";
pub const SYSTEM_PROBE_SECCOMP_KEY: &str = "system-probe-seccomp.json";
pub const SYSTEM_PROBE_SECCOMP_PROFILE_NAME: &str = "system-probe";
pub const POINTER_VOLUME_NAME: &str = "pointerdir";
pub const POINTER_VOLUME_PATH: &str = "/opt/datadog-agent/run";
pub const POD_LOG_VOLUME_NAME: &str = "logpodpath";
pub const POD_LOG_VOLUME_PATH: &str = "/var/log/pods";
pub const CONTAINER_LOG_VOLUME_NAME: &str = "logcontainerpath";
pub const CONTAINER_LOG_VOLUME_PATH: &str = "/var/lib/docker/containers";
pub const SYMLINK_CONTAINER_VOLUME_NAME: &str = "symlinkcontainerpath";
pub const SYMLINK_CONTAINER_VOLUME_PATH: &str = "/var/log/containers";
pub const EXTRA_CONFD_VOLUME_NAME: &str = "confd";
pub const EXTRA_CONFD_VOLUME_PATH: &str = "/conf.d";
pub const EXTRA_CHECKSD_VOLUME_NAME: &str = "checksd";
pub const EXTRA_CHECKSD_VOLUME_PATH: &str = "/checks.d";
pub const FIPS_CONFIG_VOLUME_NAME: &str = "fips-config";
pub const FIPS_CONFIG_MOUNT_PATH: &str = "/etc/datadog-fips-proxy/datadog-fips-proxy.cfg";
pub const FIPS_CONFIG_FILE_NAME: &str = "datadog-fips-proxy.cfg";

// 注解与标签
pub const MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY: &str = "agent.datadoghq.com/agentspechash";
pub const SYSTEM_PROBE_APPARMOR_ANNOTATION_KEY: &str =
    "container.apparmor.security.beta.kubernetes.io/system-probe";
pub const SYSTEM_PROBE_APPARMOR_ANNOTATION_VALUE: &str = "unconfined";
pub const APPARMOR_ANNOTATION_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io";
pub const COMPONENT_LABEL_KEY: &str = "agent.datadoghq.com/component";
pub const INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";
pub const PART_OF_LABEL_KEY: &str = "app.kubernetes.io/part-of";
pub const OPERATOR_NAME: &str = "datadog-operator";

// 默认密钥键
pub const DEFAULT_API_KEY_KEY: &str = "api_key";
pub const DEFAULT_APP_KEY_KEY: &str = "app_key";
pub const DEFAULT_TOKEN_KEY: &str = "token";

/// 自定义配置校验和注解键，例如 `checksum/datadog.yaml-custom-config`
pub fn checksum_annotation_key(name: &str) -> String {
    format!("checksum/{}-custom-config", name)
}
