use std::{fmt, ops};
use std::fmt::Formatter;
use std::ops::Range;
use byteorder::{BigEndian, ByteOrder};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new(vec: Vec<u8>) -> Self {
        Instructions(vec)
    }

    fn format_instruction(def: &Definition, operands: Vec<i32>) -> Result<String, String> {
        let op_count = def.operand_width.len();

        if operands.len() != op_count {
            return Err(format!("operand len {} does not match defined {}", operands.len(), op_count));
        }

        match op_count {
            0 => Ok(def.name.to_string()),
            1 => Ok(format!("{} {}", def.name, operands[0])),
            2 => Ok(format!("{} {} {}", def.name, operands[0], operands[1])),
            _ => Err(format!("unhandled op_count for {}", def.name))
        }
    }

    pub fn to_string(&self) -> Result<String, String> {
        let mut out = String::new();

        let mut pos = 0;
        while pos < self.0.len() {
            let def = match DEFINITIONS.get(self.0[pos] as usize) {
                None => return Err(format!("invalid opcode appeared: pos {}, value {}", pos, self.0[pos])),
                Some(def) => def,
            };

            let (operands, read) = read_operands(def, &Instructions(self.0[(pos+1)..].to_vec()))?;

            out += format!("{:0>4} {}\n", pos, Self::format_instruction(def, operands)?).as_str();
            pos += 1 + read as usize;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn append_vec(&mut self, other: &mut Vec<u8>) {
        self.0.append(other)
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len)
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0
    }
}

impl ops::Index<usize> for Instructions {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl ops::IndexMut<usize> for Instructions {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl ops::Index<ops::Range<usize>> for Instructions {
    type Output = [u8];

    fn index(&self, index: Range<usize>) -> &Self::Output {
        &self.0[index]
    }
}


pub type Opcode = u8;

#[derive(Eq, PartialEq)]
pub struct Definition<'a> {
    name: &'a str,
    operand_width: &'a [i32],
}

// Indexed by opcode byte, so the order must match Operation below.
pub const DEFINITIONS: &[Definition] = &[
    Definition {
        name: "OpConstant",
        operand_width: &[2],
    },
    Definition {
        name: "OpAdd",
        operand_width: &[],
    },
    Definition {
        name: "OpSub",
        operand_width: &[],
    },
    Definition {
        name: "OpMul",
        operand_width: &[],
    },
    Definition {
        name: "OpDiv",
        operand_width: &[],
    },
    Definition {
        name: "OpPop",
        operand_width: &[],
    },
    Definition {
        name: "OpTrue",
        operand_width: &[],
    },
    Definition {
        name: "OpFalse",
        operand_width: &[],
    },
    Definition {
        name: "OpEqual",
        operand_width: &[],
    },
    Definition {
        name: "OpNotEqual",
        operand_width: &[],
    },
    Definition {
        name: "OpGreaterThan",
        operand_width: &[],
    },
    Definition {
        name: "OpGreaterThanOrEqual",
        operand_width: &[],
    },
    Definition {
        name: "OpMinus",
        operand_width: &[],
    },
    Definition {
        name: "OpBang",
        operand_width: &[],
    },
    Definition {
        name: "OpJump",
        operand_width: &[2],
    },
    Definition {
        name: "OpJumpNotTruthy",
        operand_width: &[2],
    },
    Definition {
        name: "OpNull",
        operand_width: &[],
    },
    Definition {
        name: "OpSetGlobal",
        operand_width: &[2],
    },
    Definition {
        name: "OpGetGlobal",
        operand_width: &[2],
    },
    Definition {
        name: "OpArray",
        operand_width: &[2],
    },
    Definition {
        name: "OpHash",
        operand_width: &[2],
    },
    Definition {
        name: "OpIndex",
        operand_width: &[],
    },
    Definition {
        name: "OpCall",
        operand_width: &[1],
    },
    Definition {
        name: "OpReturnValue",
        operand_width: &[],
    },
    Definition {
        name: "OpReturn",
        operand_width: &[],
    },
    Definition {
        name: "OpGetLocal",
        operand_width: &[1],
    },
    Definition {
        name: "OpSetLocal",
        operand_width: &[1],
    },
    Definition {
        name: "OpGetBuiltin",
        operand_width: &[1],
    },
    Definition {
        name: "OpClosure",
        operand_width: &[2, 1],
    },
];

pub fn lookup(op_code: &Operation) -> &'static Definition<'static> {
    &DEFINITIONS[op_code.as_byte() as usize]
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    OpConstant,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpPop,
    OpTrue,
    OpFalse,
    OpEqual,
    OpNotEqual,
    OpGreaterThan,
    OpGreaterThanOrEqual,
    OpMinus,
    OpBang,
    OpJump,
    OpJumpNotTruthy,
    OpNull,
    OpSetGlobal,
    OpGetGlobal,
    OpArray,
    OpHash,
    OpIndex,
    OpCall,
    OpReturnValue,
    OpReturn,
    OpGetLocal,
    OpSetLocal,
    OpGetBuiltin,
    OpClosure,
}

impl Operation {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Operation::OpConstant),
            1 => Some(Operation::OpAdd),
            2 => Some(Operation::OpSub),
            3 => Some(Operation::OpMul),
            4 => Some(Operation::OpDiv),
            5 => Some(Operation::OpPop),
            6 => Some(Operation::OpTrue),
            7 => Some(Operation::OpFalse),
            8 => Some(Operation::OpEqual),
            9 => Some(Operation::OpNotEqual),
            10 => Some(Operation::OpGreaterThan),
            11 => Some(Operation::OpGreaterThanOrEqual),
            12 => Some(Operation::OpMinus),
            13 => Some(Operation::OpBang),
            14 => Some(Operation::OpJump),
            15 => Some(Operation::OpJumpNotTruthy),
            16 => Some(Operation::OpNull),
            17 => Some(Operation::OpSetGlobal),
            18 => Some(Operation::OpGetGlobal),
            19 => Some(Operation::OpArray),
            20 => Some(Operation::OpHash),
            21 => Some(Operation::OpIndex),
            22 => Some(Operation::OpCall),
            23 => Some(Operation::OpReturnValue),
            24 => Some(Operation::OpReturn),
            25 => Some(Operation::OpGetLocal),
            26 => Some(Operation::OpSetLocal),
            27 => Some(Operation::OpGetBuiltin),
            28 => Some(Operation::OpClosure),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Opcode {
        *self as Opcode
    }

}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", lookup(self).name)
    }
}

pub fn make(op: Opcode, operands: &Vec<i32>) -> Option<Vec<u8>> {
    let def = DEFINITIONS.get(op as usize)?;

    let mut instruction_len = 1;
    for w in def.operand_width {
        instruction_len += *w;
    }

    let mut instruction = Vec::with_capacity(instruction_len as usize);
    instruction.push(op);

    for (i, o) in operands.iter().enumerate() {
        let width = def.operand_width[i];
        match width {
            2 => {
                let mut buf: Vec<u8> = Vec::from([0; 2]);
                BigEndian::write_u16(&mut buf, *o as u16);
                instruction.append(&mut buf);
            },
            1 => {
                instruction.push(*o as u8);
            },
            _ => unreachable!(),
        }
    }

    Some(instruction)
}

// read_operands parses operand part in an instruction and returns a list of operands and an operands part length
pub fn read_operands(def: &Definition, ins: &Instructions) -> Result<(Vec<i32>, i32), String> {
    let mut operands = Vec::with_capacity(def.operand_width.len());
    let mut offset: usize = 0;

    for width in def.operand_width {
        match width {
            2 => {
                operands.push(BigEndian::read_u16(&ins.0[offset..]) as i32)
            },
            1 => {
                operands.push(ins.0[offset] as i32)
            },
            other => return Err(format!("unsupported width: {}", other))
        }
        offset += *width as usize;
    }

    Ok((operands, offset as i32))
}
