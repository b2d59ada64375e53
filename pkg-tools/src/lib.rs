// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Shared plumbing for the packaging command line tools.

The binaries (`build-tar`, `build-zip`, `make-deb`, `make-rpm`,
`tree-compare`) parse flags and delegate here: manifest-driven
pipelines that resolve per-entry mode/ownership against CLI defaults
and remaps, flag value helpers, and build stamp parsing.
*/

pub mod build_info;
pub mod helpers;
pub mod tar_pipeline;
pub mod zip_pipeline;
