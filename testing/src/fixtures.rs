//! Discovery payloads as agents report them.

use serde_json::{Value, json};

/// `host` payload.
#[must_use]
pub fn host_payload(host_name: &str, ip_addresses: &[&str], agent_version: &str) -> Value {
    json!({
        "host_name": host_name,
        "host_ip_addresses": ip_addresses,
        "agent_version": agent_version,
    })
}

/// `host` payload with every field the agent reports.
#[must_use]
pub fn full_host_payload(host_name: &str) -> Value {
    json!({
        "host_name": host_name,
        "host_ip_addresses": ["10.1.1.5", "127.0.0.1", "::1"],
        "agent_version": "0.9.1",
        "agent_bind_address": "10.1.1.5",
        "cpu_count": 64,
        "socket_count": 2,
        "total_memory_mb": 515_740,
        "os_version": "15.3",
    })
}

/// `cloud` payload.
#[must_use]
pub fn cloud_payload(provider: &str) -> Value {
    json!({ "provider": provider })
}

/// `cloud` payload of an Azure VM, instance metadata included.
#[must_use]
pub fn azure_cloud_payload() -> Value {
    json!({
        "provider": "azure",
        "metadata": {
            "compute": {
                "name": "vmhana01",
                "location": "westeurope",
                "vmSize": "Standard_E16s_v3",
                "offer": "sles-sap-15-sp3",
                "publisher": "SUSE",
                "resourceGroupName": "rg-hana"
            },
            "network": {
                "interface": [
                    { "ipv4": { "ipAddress": [{ "privateIpAddress": "10.1.1.5" }] } }
                ]
            }
        }
    })
}

/// `sap_system` payload with one database system per SID.
#[must_use]
pub fn sap_systems_payload(sids: &[&str]) -> Value {
    Value::Array(
        sids.iter()
            .enumerate()
            .map(|(i, sid)| json!({ "Id": format!("sys-{i}"), "SID": sid, "Type": 1 }))
            .collect(),
    )
}

/// `sap_system` payload of one HANA database with its profile, instance and
/// tenants.
#[must_use]
pub fn full_sap_systems_payload(sid: &str) -> Value {
    json!([
        {
            "Id": "a3279fd0-7d4c-4a8d-a0d3-fbf2ce16d3b5",
            "SID": sid,
            "Type": 1,
            "Profile": {
                "SAPSYSTEMNAME": sid,
                "SAPGLOBALHOST": "vmhana01"
            },
            "Instances": {
                "HDB00": {
                    "Host": "vmhana01",
                    "Type": 1,
                    "SAPControl": { "Properties": {}, "Instances": {}, "Processes": {} }
                }
            },
            "Databases": [
                { "Database": "SYSTEMDB", "Container": "SYSTEMDB", "User": "SYSTEM", "Active": "Yes" },
                { "Database": sid, "Container": sid, "User": "SYSTEM", "Active": "Yes" }
            ]
        }
    ])
}

/// `subscription` payload from `(identifier, version)` pairs.
#[must_use]
pub fn subscriptions_payload(records: &[(&str, &str)]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|(identifier, version)| {
                json!({
                    "identifier": identifier,
                    "version": version,
                    "arch": "x86_64",
                    "status": "Registered",
                    "regcode": "",
                    "starts_at": "2019-03-20 09:55:32 UTC",
                    "expires_at": "2024-03-20 09:55:32 UTC",
                    "subscription_status": "ACTIVE",
                    "type": "internal",
                })
            })
            .collect(),
    )
}

/// `cluster` payload without any HANA resources.
#[must_use]
pub fn cluster_payload(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "Crmmon": {
            "Summary": {
                "Nodes": { "Number": 2 },
                "Resources": { "Number": 1 }
            }
        }
    })
}

/// A two-node HANA scale-up cluster for SID `PRD`.
///
/// `vmhana01` is primary, `vmhana02` secondary in sync. `vmhana01` hosts the
/// virtual IP `192.168.123.200` and the SBD fencing device. One resource,
/// `test_stopped`, runs nowhere.
///
/// Carries every section the agent reports, including the ones no handler
/// reads (SBD, cluster properties, constraints, node states).
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn cluster_scale_up_payload(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "DC": true,
        "Provider": "azure",
        "SBD": {
            "Devices": [
                { "Device": "/dev/vdc", "Status": "healthy" }
            ],
            "Config": { "SBD_DEVICE": "/dev/vdc", "SBD_PACEMAKER": "yes" }
        },
        "Cib": {
            "Configuration": {
                "CrmConfig": {
                    "ClusterProperties": [
                        { "Id": "cib-bootstrap-options-stonith-enabled", "Name": "stonith-enabled", "Value": "true" }
                    ]
                },
                "Nodes": [
                    { "Id": "1084783375", "Uname": "vmhana01" },
                    { "Id": "1084783376", "Uname": "vmhana02" }
                ],
                "Constraints": {
                    "RscLocations": [
                        { "Id": "cli-prefer-msl_SAPHana_PRD_HDB00", "Node": "vmhana01", "Resource": "msl_SAPHana_PRD_HDB00", "Role": "Started", "Score": "INFINITY" }
                    ]
                },
                "Resources": {
                    "Primitives": [
                        {
                            "Id": "stonith-sbd",
                            "Class": "stonith",
                            "Type": "external/sbd"
                        },
                        {
                            "Id": "rsc_ip_PRD_HDB00",
                            "Class": "ocf",
                            "Type": "IPaddr2",
                            "Provider": "heartbeat",
                            "InstanceAttributes": [
                                { "Id": "rsc_ip_PRD_HDB00-instance_attributes-ip", "Name": "ip", "Value": "192.168.123.200" },
                                { "Id": "rsc_ip_PRD_HDB00-instance_attributes-cidr_netmask", "Name": "cidr_netmask", "Value": "24" }
                            ]
                        }
                    ],
                    "Clones": [
                        {
                            "Id": "cln_SAPHanaTopology_PRD_HDB00",
                            "Primitive": {
                                "Id": "rsc_SAPHanaTopology_PRD_HDB00",
                                "Class": "ocf",
                                "Type": "SAPHanaTopology",
                                "Provider": "suse",
                                "InstanceAttributes": [
                                    { "Id": "rsc_SAPHanaTopology_PRD_HDB00-instance_attributes-SID", "Name": "SID", "Value": "PRD" },
                                    { "Id": "rsc_SAPHanaTopology_PRD_HDB00-instance_attributes-InstanceNumber", "Name": "InstanceNumber", "Value": "00" }
                                ]
                            }
                        }
                    ],
                    "Masters": [
                        {
                            "Id": "msl_SAPHana_PRD_HDB00",
                            "Primitive": {
                                "Id": "rsc_SAPHana_PRD_HDB00",
                                "Class": "ocf",
                                "Type": "SAPHana",
                                "Provider": "suse",
                                "InstanceAttributes": [
                                    { "Id": "rsc_SAPHana_PRD_HDB00-instance_attributes-SID", "Name": "SID", "Value": "PRD" }
                                ]
                            }
                        }
                    ]
                }
            }
        },
        "Crmmon": {
            "Version": "2.0.0",
            "Summary": {
                "Nodes": { "Number": 2 },
                "Resources": { "Number": 8, "Disabled": 0, "Blocked": 0 },
                "LastChange": { "Time": "Fri Oct 18 11:48:54 2019" },
                "ClusterOptions": { "StonithEnabled": true }
            },
            "Nodes": [
                { "Name": "vmhana01", "Id": "1084783375", "Online": true, "DC": true, "ResourcesRunning": 7 },
                { "Name": "vmhana02", "Id": "1084783376", "Online": true, "DC": false, "ResourcesRunning": 5 }
            ],
            "NodeAttributes": {
                "Nodes": [
                    {
                        "Name": "vmhana01",
                        "Attributes": [
                            { "Name": "hana_prd_roles", "Value": "4:P:master1:master:worker:master" },
                            { "Name": "hana_prd_srmode", "Value": "sync" },
                            { "Name": "hana_prd_op_mode", "Value": "logreplay" },
                            { "Name": "hana_prd_sync_state", "Value": "PRIM" }
                        ]
                    },
                    {
                        "Name": "vmhana02",
                        "Attributes": [
                            { "Name": "hana_prd_roles", "Value": "4:S:master1:master:worker:master" },
                            { "Name": "hana_prd_srmode", "Value": "sync" },
                            { "Name": "hana_prd_op_mode", "Value": "logreplay" },
                            { "Name": "hana_prd_sync_state", "Value": "SOK" }
                        ]
                    }
                ]
            },
            "NodeHistory": {
                "Nodes": [
                    {
                        "Name": "vmhana01",
                        "ResourceHistory": [
                            { "Name": "rsc_SAPHana_PRD_HDB00", "MigrationThreshold": 5000, "FailCount": 2 }
                        ]
                    }
                ]
            },
            "Resources": [
                {
                    "Id": "stonith-sbd",
                    "Agent": "stonith:external/sbd",
                    "Role": "Started",
                    "Active": true,
                    "Managed": true,
                    "NodesRunningOn": 1,
                    "Node": { "Name": "vmhana01", "Id": "1084783375", "Cached": true }
                },
                {
                    "Id": "rsc_ip_PRD_HDB00",
                    "Agent": "ocf::heartbeat:IPaddr2",
                    "Role": "Started",
                    "Active": true,
                    "Managed": true,
                    "NodesRunningOn": 1,
                    "Node": { "Name": "vmhana01", "Id": "1084783375", "Cached": true }
                },
                {
                    "Id": "test_stopped",
                    "Agent": "ocf::heartbeat:Dummy",
                    "Role": "Stopped",
                    "Active": false,
                    "Managed": true,
                    "NodesRunningOn": 0
                }
            ],
            "Clones": [
                {
                    "Id": "cln_SAPHanaTopology_PRD_HDB00",
                    "Managed": true,
                    "Resources": [
                        {
                            "Id": "rsc_SAPHanaTopology_PRD_HDB00",
                            "Agent": "ocf::suse:SAPHanaTopology",
                            "Role": "Started",
                            "Active": true,
                            "NodesRunningOn": 1,
                            "Node": { "Name": "vmhana01", "Id": "1084783375", "Cached": true }
                        },
                        {
                            "Id": "rsc_SAPHanaTopology_PRD_HDB00",
                            "Agent": "ocf::suse:SAPHanaTopology",
                            "Role": "Started",
                            "Active": true,
                            "NodesRunningOn": 1,
                            "Node": { "Name": "vmhana02", "Id": "1084783376", "Cached": true }
                        }
                    ]
                },
                {
                    "Id": "msl_SAPHana_PRD_HDB00",
                    "MultiState": true,
                    "Managed": true,
                    "Resources": [
                        {
                            "Id": "rsc_SAPHana_PRD_HDB00",
                            "Agent": "ocf::suse:SAPHana",
                            "Role": "Master",
                            "Active": true,
                            "NodesRunningOn": 1,
                            "Node": { "Name": "vmhana01", "Id": "1084783375", "Cached": true }
                        },
                        {
                            "Id": "rsc_SAPHana_PRD_HDB00",
                            "Agent": "ocf::suse:SAPHana",
                            "Role": "Slave",
                            "Active": true,
                            "NodesRunningOn": 1,
                            "Node": { "Name": "vmhana02", "Id": "1084783376", "Cached": true }
                        }
                    ]
                }
            ]
        }
    })
}
