// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build Debian binary packages in pure Rust.

This crate produces `.deb` files without invoking `ar`, `tar`, or `dpkg-deb`.
Every byte of the output is written by this crate, so builds are
reproducible: given the same inputs and a fixed modification time, the
output is byte-for-byte identical.

# A Tour of Functionality

A `.deb` is an `ar` archive holding three members: `debian-binary`,
`control.tar` and `data.tar`. The [ar] module writes `ar` archives and the
[tar] module writes `ustar` archives. [compression::DebCompression] is
applied to both tarballs.

[package::PackageSpec] describes the package. Its version string is parsed
by [package_version::PackageVersion]. The files the package installs are held
in a [file_tree::DataTree] of [file_tree::FileEntry]. Additional entries can be
produced at build time by implementations of [file_tree::DataTreeProvider].

Content of control files, maintainer scripts, and installed files can come
from templates. [template::TemplateRenderer] is the rendering capability and
[template::HandlebarsRenderer] implements it with `handlebars`.

The [control_renderer] module produces the members of `control.tar`,
computing `Installed-Size`, `md5sums`, and `conffiles`. The [control] module
holds the control file primitives it uses.

[builder::PackageBuilder] drives a build through [builder::BuildStage]s and
writes the result atomically.

# Limitations

Tar paths are limited to 100 bytes. No GNU or PAX long name extensions are
emitted; longer paths fail the build with [error::DebpkgError::PathTooLong].
*/

pub mod ar;
pub mod builder;
pub mod compression;
pub mod control;
pub mod control_renderer;
pub mod error;
pub mod file_tree;
pub mod package;
pub mod package_version;
pub mod tar;
pub mod template;
