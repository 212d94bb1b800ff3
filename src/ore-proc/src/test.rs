// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Error, ItemFn};

/// Wraps a test function so that logging is initialized before its body runs.
pub fn test_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemFn);
    test_impl_inner(attr.into(), item).into()
}

fn test_impl_inner(attr: TokenStream2, item: ItemFn) -> TokenStream2 {
    if !attr.is_empty() {
        return Error::new_spanned(attr, "#[zf_ore::test] does not take arguments")
            .to_compile_error();
    }
    if let Some(asyncness) = &item.sig.asyncness {
        return Error::new_spanned(asyncness, "async tests are not supported").to_compile_error();
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = item;
    let stmts = block.stmts;

    quote! {
        #(#attrs)*
        #[::core::prelude::v1::test]
        #vis #sig {
            ::zf_ore::test::init_logging();
            #(#stmts)*
        }
    }
}
