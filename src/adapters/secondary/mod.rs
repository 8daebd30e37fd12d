/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

pub mod command {
    pub mod unix;
    pub use unix::*;
}
pub mod config {
    pub mod file;
    pub use file::*;
}
pub mod platform {
    pub mod sysfs;
    pub use sysfs::*;
}
pub mod source {
    pub mod direct;
    pub mod out_of_band;
    pub use direct::*;
    pub use out_of_band::*;
}

pub use command::*;
pub use config::*;
pub use platform::*;
pub use source::*;
