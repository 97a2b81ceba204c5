//! CWMP fault envelopes sent in place of a worker reply.

use crate::domain::session::DispatchError;

/// Namespace of the CWMP version faults are issued in.
const CWMP_NAMESPACE: &str = "urn:dslforum-org:cwmp-1-0";

/// ACS-side fault code for internal errors.
pub const ACS_INTERNAL_ERROR: u32 = 8002;

/// A CWMP fault as carried in a SOAP `Fault` detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CwmpFault {
    /// CWMP fault code.
    pub code: u32,
    /// Fault description.
    pub message: String,
}

impl CwmpFault {
    /// Internal error fault with `message`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ACS_INTERNAL_ERROR,
            message: message.into(),
        }
    }

    /// Fault reported when a routed request never got a worker reply.
    pub fn for_dispatch(error: &DispatchError) -> Self {
        match error {
            DispatchError::Timeout(_) => Self::internal("Internal Timeout!"),
            other => Self::internal(other.to_string()),
        }
    }

    /// Render the SOAP envelope.
    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:cwmp=\"{ns}\">\n",
                "  <soapenv:Header/>\n",
                "  <soapenv:Body>\n",
                "    <soapenv:Fault>\n",
                "      <faultcode>Server</faultcode>\n",
                "      <faultstring>CWMP fault</faultstring>\n",
                "      <detail>\n",
                "        <cwmp:Fault>\n",
                "          <FaultCode>{code}</FaultCode>\n",
                "          <FaultString>{message}</FaultString>\n",
                "        </cwmp:Fault>\n",
                "      </detail>\n",
                "    </soapenv:Fault>\n",
                "  </soapenv:Body>\n",
                "</soapenv:Envelope>\n",
            ),
            ns = CWMP_NAMESPACE,
            code = self.code,
            message = escape_xml(&self.message),
        )
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use insta::assert_snapshot;
    use rstest::rstest;

    #[rstest]
    fn timeout_fault_envelope() {
        let fault = CwmpFault::for_dispatch(&DispatchError::Timeout(Duration::from_secs(300)));
        assert_snapshot!(fault.to_xml(), @r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:cwmp="urn:dslforum-org:cwmp-1-0">
          <soapenv:Header/>
          <soapenv:Body>
            <soapenv:Fault>
              <faultcode>Server</faultcode>
              <faultstring>CWMP fault</faultstring>
              <detail>
                <cwmp:Fault>
                  <FaultCode>8002</FaultCode>
                  <FaultString>Internal Timeout!</FaultString>
                </cwmp:Fault>
              </detail>
            </soapenv:Fault>
          </soapenv:Body>
        </soapenv:Envelope>
        "#);
    }

    #[rstest]
    fn messages_are_escaped() {
        let xml = CwmpFault::internal("a < b & \"c\"").to_xml();
        assert!(xml.contains("<FaultString>a &lt; b &amp; &quot;c&quot;</FaultString>"));
    }

    #[rstest]
    fn stopped_worker_is_an_internal_error() {
        let fault = CwmpFault::for_dispatch(&DispatchError::Closed);
        assert_eq!(fault, CwmpFault::internal("session worker stopped"));
    }
}
