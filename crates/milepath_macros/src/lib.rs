use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Time a function when the `perf_stats` feature is enabled.
///
/// Wraps the function body in a drop guard that reports the elapsed time
/// through `tracing::info!` once the function returns. Without the feature
/// the attribute expands to the untouched function.
///
/// # Features
/// - Auto-detects a `map_id: u32` parameter and tags the log line with it
/// - Logs only when the duration exceeds the threshold (default 1ms)
///
/// # Example
/// ```ignore
/// #[profile]
/// fn generate_visibility_graph(&mut self) { ... }
///
/// #[profile(20)] // custom threshold in milliseconds
/// fn build(map_id: u32, data: MapSpecificData) -> MilePath { ... }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_map_id_param = sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(pat_type) = arg {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                return pat_ident.ident == "map_id";
            }
        }
        false
    });

    let profile_guard_def = if has_map_id_param {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
                map_id: u32,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() >= #threshold_ms {
                        ::tracing::info!("[PERF] {} (map {}): {:?}", self.name, self.map_id, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                map_id: map_id as u32,
            }
        }
    } else {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() >= #threshold_ms {
                        ::tracing::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #profile_guard_def
            };

            #block
        }
    };

    output.into()
}
