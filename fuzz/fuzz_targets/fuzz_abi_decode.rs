#![no_main]

use certchain_chain::abi::{self, ParamType};
use certchain_chain::ContractAbi;
use libfuzzer_sys::fuzz_target;

// Return data and calldata come from an untrusted node; decoding must fail cleanly.
fuzz_target!(|data: &[u8]| {
    let Ok(contract) = ContractAbi::bundled() else {
        return;
    };

    if let Some(function) = contract.function_for_calldata(data) {
        let _ = function.decode_input(data);
    }

    if let Ok(verify) = contract.function("verifyCertificate") {
        let _ = verify.decode_output(data);
    }

    let shapes: [&[ParamType]; 4] = [
        &[ParamType::String],
        &[ParamType::Bool],
        &[ParamType::FixedBytes(32), ParamType::Bytes],
        &[
            ParamType::String,
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::Bytes,
            ParamType::Bool,
        ],
    ];
    for types in shapes {
        if let Ok(tokens) = abi::decode(types, data) {
            // Whatever decodes must re-encode to something that decodes the same way.
            let encoded = abi::encode(&tokens);
            let again = abi::decode(types, &encoded).expect("re-encoded tokens decode");
            assert_eq!(again, tokens);
        }
    }
});
