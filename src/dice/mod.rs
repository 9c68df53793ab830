// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! DICE evidence: TcbInfo extensions, their aggregation across a
//! certificate chain, device UEIDs, GET_MEASUREMENT records and appraisal
//! against reference measurements.

pub use self::aggregator::TcbInfoAggregator;
pub use self::appraisal::{appraise, load_reference, Status};
pub use self::errors::Error;
pub use self::measurement::{encode_record, parse_record, DeviceMeasurement, SectionType};
pub use self::tcbinfo::{
    parse_multi_tcb_info, parse_tcb_info, tcb_infos_from_certificate, tcb_infos_from_extensions,
    Fwid, MaskedVendorInfo, TcbInfo, TcbInfoKey, TcbInfoValue, MULTI_TCB_INFO_OID, TCB_INFO_OID,
};
pub use self::ueid::{Ueid, UEID_OID};

mod aggregator;
mod appraisal;
mod errors;
mod measurement;
mod tcbinfo;
mod ueid;
