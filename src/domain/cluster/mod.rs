// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cluster lifecycle: requests, readiness, credentials and the provisioner facade

pub mod credentials;
pub mod provisioner;
pub mod readiness;
pub mod request;
pub mod validator;

pub use provisioner::{ClusterStatus, NodeStatus, TalosProvisioner};
pub use readiness::{PollOutcome, ReadinessSettings, ReadinessTarget, Sequencer, Stage};
pub use request::{build_request, ClusterRequest, NodeDefaults, NodeRequest, NodeResources, NodeRole};
pub use validator::{is_valid_cluster_name, ClusterValidator};
